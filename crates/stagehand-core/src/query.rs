//! Scene-graph queries: turning a selector, label or predicate into the set
//! of matching elements.
//!
//! Matching happens in two stages. The raw stage walks the tree pre-order and
//! collects every match; the visibility stage then drops elements that are
//! not visible all the way up to their window. Keeping the stages apart lets
//! a failure say whether nothing matched ([`AutomationError::NotFound`]) or
//! something matched but is hidden ([`AutomationError::NotVisible`]).
//!
//! # Criteria
//!
//! - `#id`, `.class` and compound forms such as `#save.primary` are
//!   structural selectors, handed to the toolkit's own lookup when it has one.
//! - Any other string matches elements whose text equals it exactly.
//! - [`Criterion::label_glob`] matches text with `*` and `?` wildcards.
//! - [`Criterion::predicate`] runs arbitrary code against each element.

use std::collections::HashSet;
use std::sync::Arc;

use crate::element::{Element, Window};
use crate::error::AutomationError;
use crate::windows::WindowRegistry;

/// A shared element predicate.
#[derive(Clone)]
pub struct Predicate {
    description: String,
    test: Arc<dyn Fn(&Element) -> bool + Send + Sync>,
}

impl Predicate {
    /// Wraps `test`, described as `description` in failure messages.
    pub fn new(
        description: impl Into<String>,
        test: impl Fn(&Element) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            test: Arc::new(test),
        }
    }

    /// Runs the predicate.
    pub fn matches(&self, element: &Element) -> bool {
        (self.test)(element)
    }

    /// The description given at construction.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Predicate").field(&self.description).finish()
    }
}

/// What a query looks for.
#[derive(Debug, Clone)]
pub enum Criterion {
    /// Structural selector (`#id`, `.class`, `#id.class`).
    Selector(String),
    /// Exact text match.
    Label(String),
    /// Text match with `*` and `?` wildcards.
    LabelGlob(String),
    /// Arbitrary test.
    Predicate(Predicate),
}

impl Criterion {
    /// Classifies a query string: a leading `#` or `.` makes it a
    /// structural selector, anything else is an exact label.
    pub fn parse(query: &str) -> Self {
        if query.starts_with('#') || query.starts_with('.') {
            Self::Selector(query.to_string())
        } else {
            Self::Label(query.to_string())
        }
    }

    /// Wildcard label criterion.
    pub fn label_glob(pattern: impl Into<String>) -> Self {
        Self::LabelGlob(pattern.into())
    }

    /// Predicate criterion.
    pub fn predicate(
        description: impl Into<String>,
        test: impl Fn(&Element) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate(Predicate::new(description, test))
    }

    /// The criterion as reported in failures.
    pub fn describe(&self) -> String {
        match self {
            Self::Selector(s) => s.clone(),
            Self::Label(s) => format!("\"{}\"", s),
            Self::LabelGlob(s) => format!("\"{}\" (glob)", s),
            Self::Predicate(p) => format!("predicate <{}>", p.description()),
        }
    }

    fn matches(&self, element: &Element) -> bool {
        match self {
            Self::Selector(selector) => {
                StructuralSelector::parse(selector).is_some_and(|s| s.matches(element))
            }
            Self::Label(label) => element.text().as_deref() == Some(label.as_str()),
            Self::LabelGlob(pattern) => element.text().is_some_and(|text| glob_match(pattern, &text)),
            Self::Predicate(predicate) => predicate.matches(element),
        }
    }
}

impl From<&str> for Criterion {
    fn from(query: &str) -> Self {
        Self::parse(query)
    }
}

impl From<String> for Criterion {
    fn from(query: String) -> Self {
        Self::parse(&query)
    }
}

impl From<Predicate> for Criterion {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

/// `#id` / `.class` selector, parsed.
#[derive(Debug, Default, PartialEq)]
struct StructuralSelector {
    id: Option<String>,
    classes: Vec<String>,
}

impl StructuralSelector {
    fn parse(selector: &str) -> Option<Self> {
        let mut parsed = Self::default();
        let mut rest = selector.trim();
        while !rest.is_empty() {
            let marker = rest.chars().next()?;
            let body = &rest[marker.len_utf8()..];
            let end = body.find(['#', '.']).unwrap_or(body.len());
            let name = &body[..end];
            if name.is_empty() {
                return None;
            }
            match marker {
                '#' if parsed.id.is_none() => parsed.id = Some(name.to_string()),
                '.' => parsed.classes.push(name.to_string()),
                _ => return None,
            }
            rest = &body[end..];
        }
        (parsed.id.is_some() || !parsed.classes.is_empty()).then_some(parsed)
    }

    fn matches(&self, element: &Element) -> bool {
        if let Some(id) = &self.id {
            if element.id().as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if self.classes.is_empty() {
            return true;
        }
        let classes = element.style_classes();
        self.classes.iter().all(|c| classes.contains(c))
    }
}

/// Matches a string against a glob pattern with `*` (any run) and `?`
/// (single char).
fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains(['*', '?']) {
        return pattern == text;
    }

    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    let (plen, tlen) = (pat.len(), txt.len());

    // dp[i][j]: pat[..i] matches txt[..j]
    let mut dp = vec![vec![false; tlen + 1]; plen + 1];
    dp[0][0] = true;
    for i in 1..=plen {
        if pat[i - 1] == '*' {
            dp[i][0] = dp[i - 1][0];
        }
    }
    for i in 1..=plen {
        for j in 1..=tlen {
            if pat[i - 1] == '*' {
                dp[i][j] = dp[i - 1][j] || dp[i][j - 1];
            } else if pat[i - 1] == '?' || pat[i - 1] == txt[j - 1] {
                dp[i][j] = dp[i - 1][j - 1];
            }
        }
    }
    dp[plen][tlen]
}

/// Elements in first-found order, deduplicated by identity.
///
/// Two distinct elements with identical content are both kept.
#[derive(Debug, Clone, Default)]
pub struct ElementSet {
    elements: Vec<Element>,
    seen: HashSet<usize>,
}

impl ElementSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `element` unless the same node is already present. Returns
    /// whether it was added.
    pub fn insert(&mut self, element: Element) -> bool {
        if self.seen.insert(element.key()) {
            self.elements.push(element);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The first element found.
    pub fn first(&self) -> Option<&Element> {
        self.elements.first()
    }

    pub fn contains(&self, element: &Element) -> bool {
        self.seen.contains(&element.key())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.elements.iter()
    }

    /// Elements satisfying `keep`, in the same order.
    pub fn filtered(&self, keep: impl Fn(&Element) -> bool) -> Self {
        self.elements.iter().filter(|e| keep(*e)).cloned().collect()
    }

    pub fn into_vec(self) -> Vec<Element> {
        self.elements
    }
}

impl FromIterator<Element> for ElementSet {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        let mut set = Self::new();
        for element in iter {
            set.insert(element);
        }
        set
    }
}

impl IntoIterator for ElementSet {
    type Item = Element;
    type IntoIter = std::vec::IntoIter<Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'a> IntoIterator for &'a ElementSet {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Recursive, predicate-driven search over the element tree.
#[derive(Debug, Clone)]
pub struct SceneGraphIndex {
    windows: WindowRegistry,
}

impl SceneGraphIndex {
    /// Creates an index that searches the registry's windows.
    pub fn new(windows: WindowRegistry) -> Self {
        Self { windows }
    }

    /// The registry this index searches.
    pub fn windows(&self) -> &WindowRegistry {
        &self.windows
    }

    /// Visible matches for `criterion` under `roots`.
    ///
    /// Fails with [`AutomationError::NotFound`] when nothing matches and
    /// [`AutomationError::NotVisible`] when every match is hidden.
    pub fn query(&self, criterion: &Criterion, roots: &[Element]) -> Result<ElementSet, AutomationError> {
        let raw = self.query_raw(criterion, roots);
        visible_subset(criterion, raw)
    }

    /// Visible matches across every window, nearest to the last-targeted
    /// window first.
    pub fn lookup(&self, criterion: &Criterion) -> Result<ElementSet, AutomationError> {
        let roots = roots_of(&self.windows.list_targeted());
        self.query(criterion, &roots)
    }

    /// Visible matches below (and including) the elements of `scope`.
    pub fn query_from(&self, criterion: &Criterion, scope: &ElementSet) -> Result<ElementSet, AutomationError> {
        let roots: Vec<Element> = scope.iter().cloned().collect();
        self.query(criterion, &roots)
    }

    /// Every match, visible or not, in pre-order from each root.
    pub fn query_raw(&self, criterion: &Criterion, roots: &[Element]) -> ElementSet {
        let mut found = ElementSet::new();
        match criterion {
            Criterion::Selector(selector) => {
                for root in roots {
                    match root.node().lookup_all(selector) {
                        Some(native) => {
                            for element in native {
                                found.insert(element);
                            }
                        }
                        None => collect_matches(root, criterion, &mut found),
                    }
                }
            }
            _ => {
                for root in roots {
                    collect_matches(root, criterion, &mut found);
                }
            }
        }
        found
    }
}

/// Scene roots of `windows`, in window order.
pub(crate) fn roots_of(windows: &[Window]) -> Vec<Element> {
    windows.iter().flat_map(|w| w.roots()).collect()
}

/// Applies the visibility stage to a raw match set.
pub(crate) fn visible_subset(criterion: &Criterion, raw: ElementSet) -> Result<ElementSet, AutomationError> {
    if raw.is_empty() {
        return Err(AutomationError::NotFound {
            criterion: criterion.describe(),
        });
    }
    let visible = raw.filtered(Element::is_tree_visible);
    if visible.is_empty() {
        return Err(AutomationError::NotVisible {
            criterion: criterion.describe(),
            matched: raw.len(),
        });
    }
    Ok(visible)
}

fn collect_matches(node: &Element, criterion: &Criterion, found: &mut ElementSet) {
    // Explicit stack keeps deep trees off the call stack; children are
    // pushed in reverse so they pop in order.
    let mut stack = vec![node.clone()];
    while let Some(current) = stack.pop() {
        if criterion.matches(&current) {
            found.insert(current.clone());
        }
        if current.node().is_container() {
            stack.extend(current.children().into_iter().rev());
        }
    }
}
