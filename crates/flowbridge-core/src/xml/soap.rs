//! SOAP envelope framing.

use crate::xml::dom::{XmlDocument, XmlElement};
use crate::CoreError;
use quick_xml::escape::escape;

/// SOAP 1.1 envelope namespace
pub const SOAP11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP 1.2 envelope namespace
pub const SOAP12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Wrap a body fragment in a minimal SOAP 1.1 envelope
pub fn wrap(body: &str) -> String {
    let body = strip_declaration(body);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <soap:Envelope xmlns:soap=\"{}\">\n  <soap:Body>\n{}  </soap:Body>\n</soap:Envelope>",
        SOAP11_NS, body
    )
}

/// Extract the first element child of the envelope's `Body`, serialized
/// without an XML declaration
pub fn unwrap(envelope: &str) -> Result<String, CoreError> {
    let doc = XmlDocument::parse(envelope)
        .map_err(|e| CoreError::MalformedEnvelope(e.to_string()))?;

    let (body_path, in_scope) = find_body(&doc.root, SOAP11_NS)
        .or_else(|| find_body(&doc.root, SOAP12_NS))
        .ok_or_else(|| CoreError::MalformedEnvelope("No SOAP Body element found".to_string()))?;

    let body = doc
        .root
        .element_at(&body_path)
        .ok_or_else(|| CoreError::MalformedEnvelope("No SOAP Body element found".to_string()))?;
    let payload = body
        .child_elements()
        .next()
        .ok_or_else(|| CoreError::MalformedEnvelope("SOAP Body has no element content".to_string()))?;

    let mut scope = in_scope;
    scope.extend(body.namespace_declarations());
    Ok(payload.detached(&scope).to_xml())
}

/// Whether a message is already a full envelope: it starts with an XML
/// prolog and mentions `Envelope`, or it is markup with a prefixed
/// `:Envelope` tag.
pub fn is_envelope(message: &str) -> bool {
    let trimmed = message.trim();
    (trimmed.starts_with("<?xml") && trimmed.contains("Envelope"))
        || (trimmed.starts_with('<') && trimmed.contains(":Envelope"))
}

/// Whether a flow result can be returned to a SOAP caller as-is
pub fn is_envelope_response(message: &str) -> bool {
    message.contains("Envelope") && (message.contains("soap:") || message.contains("SOAP-ENV:"))
}

/// Body element answering a SOAP call whose message a filter step dropped
pub fn filtered(step: &str, reason: &str) -> String {
    format!("<filtered step=\"{}\">{}</filtered>", escape(step), escape(reason))
}

/// SOAP 1.1 fault envelope
pub fn fault(code: &str, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <soap:Envelope xmlns:soap=\"{}\">\n  <soap:Body>\n    <soap:Fault>\n      \
         <faultcode>soap:{}</faultcode>\n      <faultstring>{}</faultstring>\n    \
         </soap:Fault>\n  </soap:Body>\n</soap:Envelope>",
        SOAP11_NS,
        code,
        escape(message)
    )
}

// Depth-first search for `Body` in the given namespace, returning its path
// and the namespace declarations of its ancestors.
fn find_body(root: &XmlElement, namespace: &str) -> Option<(Vec<usize>, Vec<(String, String)>)> {
    fn walk(
        element: &XmlElement,
        namespace: &str,
        path: &mut Vec<usize>,
        scope: &mut Vec<(String, String)>,
    ) -> Option<(Vec<usize>, Vec<(String, String)>)> {
        if element.local_name() == "Body" && element.namespace.as_deref() == Some(namespace) {
            return Some((path.clone(), scope.clone()));
        }
        let mark = scope.len();
        scope.extend(element.namespace_declarations());
        for (index, child) in element.indexed_child_elements() {
            path.push(index);
            let found = walk(child, namespace, path, scope);
            path.pop();
            if found.is_some() {
                return found;
            }
        }
        scope.truncate(mark);
        None
    }

    walk(root, namespace, &mut Vec::new(), &mut Vec::new())
}

fn strip_declaration(body: &str) -> &str {
    let trimmed = body.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    body
}
