use ego_tree::NodeId;
use scraper::{node::Text, ElementRef, Html, Node, Selector};

use crate::config::{ConfigError, SelectorConfig};

/// Class of the elements this crate appends to the page. Their presence marks a node as already
/// annotated, and their text is ignored when reading durations back.
pub const ANNOTATION_CLASS: &str = "pacedays-annotation";

/// Compiled form of [SelectorConfig].
#[derive(Debug, Clone)]
pub struct Selectors {
    month_total: Selector,
    day: Selector,
    day_hours: Selector,
    outside_month_class: String,
    period_label: Selector,
}

impl Selectors {
    pub fn compile(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            month_total: compile_selector(&config.month_total)?,
            day: compile_selector(&config.day)?,
            day_hours: compile_selector(&config.day_hours)?,
            outside_month_class: config.outside_month_class.clone(),
            period_label: compile_selector(&config.period_label)?,
        })
    }
}

fn compile_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        selector: selector.into(),
        reason: format!("{e:?}"),
    })
}

/// A parsed snapshot of the timesheet page.
pub struct Page {
    html: Html,
}

impl Page {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// The node showing the total for the displayed month.
    pub fn month_total(&self, selectors: &Selectors) -> Option<ElementRef<'_>> {
        self.html.select(&selectors.month_total).next()
    }

    /// `March, 2024` style label of the displayed month. Blank labels count as missing.
    pub fn period_label(&self, selectors: &Selectors) -> Option<String> {
        self.html
            .select(&selectors.period_label)
            .next()
            .map(visible_text)
            .filter(|label| !label.is_empty())
    }

    /// Duration leaves of every day that belongs to the displayed month.
    pub fn current_month_days(&self, selectors: &Selectors) -> Vec<ElementRef<'_>> {
        self.html
            .select(&selectors.day)
            .filter(|day| {
                !day.value()
                    .classes()
                    .any(|class| class == selectors.outside_month_class)
            })
            .flat_map(|day| day.select(&selectors.day_hours))
            .collect()
    }
}

/// Text of an element the way a reader sees it, minus anything we appended ourselves.
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    collect_text(element, &mut text);
    text.trim().to_string()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            if !is_annotation(child) {
                collect_text(child, out);
            }
        }
    }
}

fn is_annotation(element: ElementRef<'_>) -> bool {
    element.value().classes().any(|class| class == ANNOTATION_CLASS)
}

/// Text of the annotation previously appended to `element`, if there is one.
pub fn existing_annotation(element: ElementRef<'_>) -> Option<String> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .find(|child| is_annotation(*child))
        .map(|child| child.text().collect::<String>())
}

/// Annotations planned for a [Page]. Nodes are only ever annotated once: adding to the same node
/// replaces the text, and applying replaces an annotation left by an earlier run instead of
/// appending a second one.
pub struct Annotations<'a> {
    entries: Vec<(ElementRef<'a>, String)>,
}

impl<'a> Annotations<'a> {
    pub fn new() -> Self {
        Self { entries: vec![] }
    }

    pub fn add(&mut self, element: ElementRef<'a>, text: String) {
        match self.entries.iter_mut().find(|(e, _)| e.id() == element.id()) {
            Some((_, existing)) => *existing = text,
            None => self.entries.push((element, text)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether applying would produce something different from the parsed page.
    pub fn is_changed(&self) -> bool {
        self.entries
            .iter()
            .any(|(element, text)| existing_annotation(*element).as_deref() != Some(text.as_str()))
    }

    /// Releases the borrow of the page, so the edits can be applied with [Page::render].
    pub fn into_edits(self) -> AnnotationEdits {
        AnnotationEdits(
            self.entries
                .into_iter()
                .map(|(element, text)| {
                    let stale = element
                        .children()
                        .filter_map(ElementRef::wrap)
                        .filter(|child| is_annotation(*child))
                        .map(|child| child.id())
                        .collect();
                    (element.id(), stale, text)
                })
                .collect(),
        )
    }
}

impl Default for Annotations<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Node to annotate, its stale annotations and the new text.
pub struct AnnotationEdits(Vec<(NodeId, Vec<NodeId>, String)>);

impl Page {
    /// Grafts the annotations into the parsed tree and serializes the result.
    pub fn render(mut self, edits: AnnotationEdits) -> String {
        let tree = &mut self.html.tree;
        for (target, stale, text) in edits.0 {
            for id in stale {
                if let Some(mut node) = tree.get_mut(id) {
                    node.detach();
                }
            }

            let Some((paragraph, content)) = annotation_nodes(&text) else {
                continue;
            };
            if let Some(mut node) = tree.get_mut(target) {
                node.append(paragraph).append(content);
            }
        }
        self.html.html()
    }
}

/// Element and text nodes of `<p class="pacedays-annotation">text</p>`.
fn annotation_nodes(text: &str) -> Option<(Node, Node)> {
    let fragment = Html::parse_fragment(&format!("<p class=\"{ANNOTATION_CLASS}\"></p>"));
    let paragraph = fragment
        .root_element()
        .children()
        .find(|child| child.value().is_element())?
        .value()
        .clone();
    let content = Node::Text(Text { text: text.into() });
    Some((paragraph, content))
}
