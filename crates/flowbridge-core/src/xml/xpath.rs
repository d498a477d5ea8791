//! XPath subset used by field mappings.
//!
//! Supported: absolute (`/a/b`) and relative (`b/c`) location paths, the
//! descendant shorthand (`//b`), `*`, `.`, `..`, a trailing `@attr` or
//! `text()`, and predicates `[n]`, `[last()]`, `[*]`, `[@a]`, `[@a='v']`
//! and `[child='v']`. Name tests ignore namespaces unless a prefix is given.

use crate::xml::dom::{XmlDocument, XmlElement};
use crate::CoreError;

/// Path of child indices from the document element to an element
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    SelfNode,
    Parent,
    Name {
        prefix: Option<String>,
        local: String,
    },
}

impl NameTest {
    fn matches(&self, element: &XmlElement) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::SelfNode | NameTest::Parent => false,
            NameTest::Name { prefix, local } => {
                element.local_name() == local
                    && prefix
                        .as_deref()
                        .map_or(true, |p| element.prefix() == Some(p))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    All,
    HasAttribute(String),
    AttributeEquals(String, String),
    ChildEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tail {
    Attribute(String),
    Text,
}

/// A compiled XPath expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    absolute: bool,
    steps: Vec<Step>,
    tail: Option<(Axis, Tail)>,
}

/// A node selected by an expression
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum XPathMatch {
    /// An element
    Element(NodePath),
    /// An attribute of an element
    Attribute(NodePath, String),
    /// The text of an element
    Text(NodePath),
}

impl XPathMatch {
    /// Element the match belongs to
    pub fn element_path(&self) -> &[usize] {
        match self {
            XPathMatch::Element(p) | XPathMatch::Attribute(p, _) | XPathMatch::Text(p) => p,
        }
    }

    /// XPath string value of the match
    pub fn string_value(&self, doc: &XmlDocument) -> Option<String> {
        let element = doc.root.element_at(self.element_path())?;
        match self {
            XPathMatch::Element(_) | XPathMatch::Text(_) => Some(element.text()),
            XPathMatch::Attribute(_, name) => element.attribute(name).map(str::to_string),
        }
    }
}

// Context node: `None` is the document node above the root element.
type Context = Option<NodePath>;

impl XPath {
    /// Compile an expression
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(CoreError::XmlError("Empty XPath expression".to_string()));
        }

        let chars: Vec<char> = expr.chars().collect();
        let absolute = chars[0] == '/';
        let mut steps = Vec::new();
        let mut tail = None;
        let mut i = 0;

        while i < chars.len() {
            let axis = if chars[i..].starts_with(&['/', '/']) {
                i += 2;
                Axis::Descendant
            } else if chars[i] == '/' {
                i += 1;
                Axis::Child
            } else {
                Axis::Child
            };

            let start = i;
            let mut depth = 0usize;
            let mut quote: Option<char> = None;
            while i < chars.len() {
                let c = chars[i];
                match quote {
                    Some(q) if c == q => quote = None,
                    Some(_) => {}
                    None => match c {
                        '\'' | '"' => quote = Some(c),
                        '[' => depth += 1,
                        ']' => depth = depth.saturating_sub(1),
                        '/' if depth == 0 => break,
                        _ => {}
                    },
                }
                i += 1;
            }

            let token: String = chars[start..i].iter().collect();
            let token = token.trim();
            if token.is_empty() {
                return Err(CoreError::XmlError(format!("Invalid XPath expression: {}", expr)));
            }
            if tail.is_some() {
                return Err(CoreError::XmlError(format!(
                    "Attribute or text() must be the last step: {}",
                    expr
                )));
            }

            if let Some(attr) = token.strip_prefix('@') {
                tail = Some((axis, Tail::Attribute(attr.to_string())));
            } else if token == "text()" {
                tail = Some((axis, Tail::Text));
            } else {
                steps.push(parse_step(axis, token, expr)?);
            }
        }

        Ok(Self {
            absolute,
            steps,
            tail,
        })
    }

    /// Whether the expression starts at the document node
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Evaluate against a document, relative to `context` (the document
    /// element when `None`)
    pub fn select(&self, doc: &XmlDocument, context: Option<&[usize]>) -> Vec<XPathMatch> {
        let mut current: Vec<Context> = if self.absolute {
            vec![None]
        } else {
            vec![Some(context.map(<[usize]>::to_vec).unwrap_or_default())]
        };

        for step in &self.steps {
            current = apply_step(doc, &current, step);
        }

        let Some((axis, tail)) = &self.tail else {
            return current
                .into_iter()
                .flatten()
                .map(XPathMatch::Element)
                .collect();
        };

        let mut elements: Vec<NodePath> = match axis {
            Axis::Child => current.into_iter().flatten().collect(),
            Axis::Descendant => {
                let mut all = Vec::new();
                for ctx in &current {
                    if let Some(path) = ctx {
                        all.push(path.clone());
                    }
                    all.extend(descendants(doc, ctx));
                }
                all
            }
        };
        elements.sort();
        elements.dedup();

        elements
            .into_iter()
            .filter_map(|path| match tail {
                Tail::Text => Some(XPathMatch::Text(path)),
                Tail::Attribute(name) => doc
                    .root
                    .element_at(&path)
                    .and_then(|e| e.attribute(name))
                    .map(|_| XPathMatch::Attribute(path, name.clone())),
            })
            .collect()
    }
}

fn parse_step(axis: Axis, token: &str, expr: &str) -> Result<Step, CoreError> {
    let (name, mut rest) = match token.find('[') {
        Some(pos) => (token[..pos].trim(), &token[pos..]),
        None => (token, ""),
    };

    let test = match name {
        "*" | "node()" => NameTest::Any,
        "." => NameTest::SelfNode,
        ".." => NameTest::Parent,
        _ => {
            if !name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
            {
                return Err(CoreError::XmlError(format!(
                    "Unsupported XPath step '{}' in {}",
                    name, expr
                )));
            }
            match name.split_once(':') {
                Some((p, l)) => NameTest::Name {
                    prefix: Some(p.to_string()),
                    local: l.to_string(),
                },
                None => NameTest::Name {
                    prefix: None,
                    local: name.to_string(),
                },
            }
        }
    };

    let mut predicates = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        let end = stripped
            .find(']')
            .ok_or_else(|| CoreError::XmlError(format!("Unclosed predicate in {}", expr)))?;
        predicates.push(parse_predicate(stripped[..end].trim(), expr)?);
        rest = stripped[end + 1..].trim_start();
    }
    if !rest.is_empty() {
        return Err(CoreError::XmlError(format!("Invalid XPath step '{}' in {}", token, expr)));
    }

    Ok(Step {
        axis,
        test,
        predicates,
    })
}

fn parse_predicate(body: &str, expr: &str) -> Result<Predicate, CoreError> {
    if body == "*" {
        return Ok(Predicate::All);
    }
    if body == "last()" {
        return Ok(Predicate::Last);
    }
    if let Ok(n) = body.parse::<usize>() {
        if n == 0 {
            return Err(CoreError::XmlError(format!("XPath positions start at 1: {}", expr)));
        }
        return Ok(Predicate::Position(n));
    }
    if let Some((lhs, rhs)) = body.split_once('=') {
        let value = unquote(rhs.trim()).ok_or_else(|| {
            CoreError::XmlError(format!("Predicate value must be quoted in {}", expr))
        })?;
        let lhs = lhs.trim();
        return Ok(match lhs.strip_prefix('@') {
            Some(attr) => Predicate::AttributeEquals(attr.to_string(), value),
            None => Predicate::ChildEquals(lhs.to_string(), value),
        });
    }
    if let Some(attr) = body.strip_prefix('@') {
        return Ok(Predicate::HasAttribute(attr.to_string()));
    }
    Err(CoreError::XmlError(format!(
        "Unsupported predicate [{}] in {}",
        body, expr
    )))
}

fn unquote(s: &str) -> Option<String> {
    let first = s.chars().next()?;
    if (first == '\'' || first == '"') && s.len() >= 2 && s.ends_with(first) {
        Some(s[1..s.len() - 1].to_string())
    } else {
        None
    }
}

fn element<'a>(doc: &'a XmlDocument, path: &[usize]) -> Option<&'a XmlElement> {
    doc.root.element_at(path)
}

fn children(doc: &XmlDocument, ctx: &Context) -> Vec<NodePath> {
    match ctx {
        None => vec![Vec::new()],
        Some(path) => element(doc, path)
            .map(|e| {
                e.indexed_child_elements()
                    .map(|(i, _)| {
                        let mut child = path.clone();
                        child.push(i);
                        child
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn descendants(doc: &XmlDocument, ctx: &Context) -> Vec<NodePath> {
    let mut out = Vec::new();
    let mut stack: Vec<NodePath> = children(doc, ctx);
    stack.reverse();
    while let Some(path) = stack.pop() {
        let mut kids = children(doc, &Some(path.clone()));
        kids.reverse();
        out.push(path);
        stack.extend(kids);
    }
    out
}

fn apply_step(doc: &XmlDocument, contexts: &[Context], step: &Step) -> Vec<Context> {
    let mut result: Vec<NodePath> = Vec::new();
    let mut reached_document = false;

    for ctx in contexts {
        // Candidate groups share a parent so positional predicates are
        // evaluated per parent.
        let groups: Vec<Vec<NodePath>> = match (&step.test, step.axis) {
            (NameTest::SelfNode, _) => match ctx {
                Some(path) => vec![vec![path.clone()]],
                None => {
                    reached_document = true;
                    Vec::new()
                }
            },
            (NameTest::Parent, _) => match ctx {
                Some(path) if !path.is_empty() => vec![vec![path[..path.len() - 1].to_vec()]],
                _ => {
                    reached_document = true;
                    Vec::new()
                }
            },
            (_, Axis::Child) => vec![children(doc, ctx)],
            (_, Axis::Descendant) => {
                let mut parents: Vec<Context> = vec![ctx.clone()];
                parents.extend(descendants(doc, ctx).into_iter().map(Some));
                parents.iter().map(|p| children(doc, p)).collect()
            }
        };

        for group in groups {
            let matching: Vec<NodePath> = group
                .into_iter()
                .filter(|path| match &step.test {
                    NameTest::SelfNode | NameTest::Parent => true,
                    test => element(doc, path).map_or(false, |e| test.matches(e)),
                })
                .collect();
            result.extend(filter_predicates(doc, matching, &step.predicates));
        }
    }

    result.sort();
    result.dedup();
    let mut out: Vec<Context> = Vec::new();
    if reached_document {
        out.push(None);
    }
    out.extend(result.into_iter().map(Some));
    out
}

fn filter_predicates(
    doc: &XmlDocument,
    mut nodes: Vec<NodePath>,
    predicates: &[Predicate],
) -> Vec<NodePath> {
    for predicate in predicates {
        nodes = match predicate {
            Predicate::All => nodes,
            Predicate::Position(n) => nodes.into_iter().nth(n - 1).into_iter().collect(),
            Predicate::Last => nodes.into_iter().last().into_iter().collect(),
            Predicate::HasAttribute(name) => nodes
                .into_iter()
                .filter(|p| element(doc, p).and_then(|e| e.attribute(name)).is_some())
                .collect(),
            Predicate::AttributeEquals(name, value) => nodes
                .into_iter()
                .filter(|p| {
                    element(doc, p).and_then(|e| e.attribute(name)) == Some(value.as_str())
                })
                .collect(),
            Predicate::ChildEquals(name, value) => nodes
                .into_iter()
                .filter(|p| {
                    element(doc, p).map_or(false, |e| {
                        e.child_elements()
                            .any(|c| c.local_name() == name && c.text() == *value)
                    })
                })
                .collect(),
        };
    }
    nodes
}

/// Evaluate and return the first match's string value
pub fn select_first_value(
    doc: &XmlDocument,
    context: Option<&[usize]>,
    expr: &str,
) -> Result<Option<String>, CoreError> {
    let xpath = XPath::parse(expr)?;
    Ok(xpath
        .select(doc, context)
        .first()
        .and_then(|m| m.string_value(doc)))
}

/// Write `value` at `expr`, updating the first existing match or creating
/// the missing path below the document element
pub fn set_value(doc: &mut XmlDocument, expr: &str, value: &str) -> Result<(), CoreError> {
    let xpath = XPath::parse(expr)?;

    if let Some(found) = xpath.select(doc, None).into_iter().next() {
        return write_match(doc, &found, value);
    }

    let mut steps = xpath.steps.as_slice();
    let mut path: NodePath = Vec::new();

    // The first step of an absolute path may name the document element itself.
    if let Some(first) = steps.first() {
        if xpath.absolute && first.axis == Axis::Child && first.test.matches(&doc.root) {
            steps = &steps[1..];
        } else if first.axis == Axis::Descendant {
            let lookup = XPath {
                absolute: true,
                steps: vec![first.clone()],
                tail: None,
            };
            if let Some(existing) = lookup.select(doc, None).into_iter().next() {
                path = existing.element_path().to_vec();
                steps = &steps[1..];
            }
        }
    }

    for step in steps {
        path = ensure_child(doc, &path, step, expr)?;
    }

    let target = match &xpath.tail {
        Some((_, Tail::Attribute(name))) => XPathMatch::Attribute(path, name.clone()),
        Some((_, Tail::Text)) => XPathMatch::Text(path),
        None => XPathMatch::Element(path),
    };
    write_match(doc, &target, value)
}

fn ensure_child(
    doc: &mut XmlDocument,
    parent: &[usize],
    step: &Step,
    expr: &str,
) -> Result<NodePath, CoreError> {
    let NameTest::Name { prefix, local } = &step.test else {
        return Err(CoreError::XmlError(format!(
            "Cannot create nodes for wildcard or relative steps in {}",
            expr
        )));
    };
    let position = step
        .predicates
        .iter()
        .find_map(|p| match p {
            Predicate::Position(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(1);
    let qualified = match prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.clone(),
    };

    let element = doc
        .root
        .element_at_mut(parent)
        .ok_or_else(|| CoreError::XmlError(format!("Lost track of node while creating {}", expr)))?;

    let mut existing: Vec<usize> = element
        .indexed_child_elements()
        .filter(|(_, e)| step.test.matches(e))
        .map(|(i, _)| i)
        .collect();
    while existing.len() < position {
        existing.push(element.append_child(XmlElement::new(qualified.clone())));
    }

    let mut path = parent.to_vec();
    path.push(existing[position - 1]);
    Ok(path)
}

fn write_match(doc: &mut XmlDocument, target: &XPathMatch, value: &str) -> Result<(), CoreError> {
    let element = doc
        .root
        .element_at_mut(target.element_path())
        .ok_or_else(|| CoreError::XmlError("Selected node no longer exists".to_string()))?;
    match target {
        XPathMatch::Element(_) | XPathMatch::Text(_) => element.set_text(value),
        XPathMatch::Attribute(_, name) => element.set_attribute(name, value),
    }
    Ok(())
}
