//! DOM-backed [`ActionDocument`] and the lookup strategies built from config.

use tabrun::{ActionDocument, LookupStrategy, StrategyChain};
use tabrun_protocol::LookupRule;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement};

pub struct WebDocument {
    document: Document,
}

impl WebDocument {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl ActionDocument for WebDocument {
    type Element = HtmlElement;

    fn perform(&self, element: &HtmlElement) -> Result<(), String> {
        element.click();
        Ok(())
    }
}

/// Plain `querySelector` against the document.
pub struct CssStrategy {
    label: String,
    selector: String,
}

impl LookupStrategy<WebDocument> for CssStrategy {
    fn name(&self) -> &str {
        &self.label
    }

    fn find(&self, doc: &WebDocument) -> Option<HtmlElement> {
        as_html(doc.document.query_selector(&self.selector).ok().flatten())
    }
}

/// Looks inside the open shadow root of every element matching `host`.
pub struct ShadowStrategy {
    label: String,
    host: String,
    selector: String,
}

impl LookupStrategy<WebDocument> for ShadowStrategy {
    fn name(&self) -> &str {
        &self.label
    }

    fn find(&self, doc: &WebDocument) -> Option<HtmlElement> {
        let hosts = doc.document.query_selector_all(&self.host).ok()?;
        (0..hosts.length())
            .filter_map(|i| hosts.item(i)?.dyn_into::<Element>().ok())
            .filter_map(|host| host.shadow_root())
            .find_map(|root| as_html(root.query_selector(&self.selector).ok().flatten()))
    }
}

fn as_html(element: Option<Element>) -> Option<HtmlElement> {
    element?.dyn_into::<HtmlElement>().ok()
}

/// Builds the lookup chain in rule order.
pub fn strategy_chain(rules: &[LookupRule]) -> StrategyChain<WebDocument> {
    let mut chain = StrategyChain::new();
    for rule in rules {
        let label = rule.label();
        match rule {
            LookupRule::Css { selector } => chain.push(CssStrategy {
                label,
                selector: selector.clone(),
            }),
            LookupRule::Shadow { host, selector } => chain.push(ShadowStrategy {
                label,
                host: host.clone(),
                selector: selector.clone(),
            }),
        }
    }
    chain
}
