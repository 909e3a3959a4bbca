//! Custom Elements
//!
//! Custom element registry, definitions and `whenDefined` futures.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::element::ElementConstructor;
use crate::error::DefinitionError;

/// Names that match the custom element grammar but belong to SVG/MathML
const RESERVED_NAMES: &[&str] = &[
    "annotation-xml",
    "color-profile",
    "font-face",
    "font-face-src",
    "font-face-uri",
    "font-face-format",
    "font-face-name",
    "missing-glyph",
];

/// Built-in HTML elements a customized built-in may extend
const EXTENDABLE_ELEMENTS: &[&str] = &[
    "a", "abbr", "address", "article", "aside", "audio", "b", "blockquote", "body", "button",
    "canvas", "caption", "details", "dialog", "div", "dl", "em", "fieldset", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "i", "img", "input", "label", "li",
    "main", "nav", "ol", "option", "p", "pre", "progress", "section", "select", "span", "strong",
    "table", "tbody", "td", "textarea", "tfoot", "th", "thead", "tr", "ul", "video",
];

/// Check a name against `[a-z][a-z0-9]*-[a-z0-9-]*` and the reserved set
pub fn is_valid_custom_element_name(name: &str) -> bool {
    let bytes = name.as_bytes();

    // Must start with lowercase letter
    if !bytes.first().is_some_and(|b| b.is_ascii_lowercase()) {
        return false;
    }

    // Must contain hyphen
    let Some(hyphen) = name.find('-') else {
        return false;
    };

    let head_ok = bytes[1..hyphen].iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    let tail_ok = bytes[hyphen + 1..]
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
    if !head_ok || !tail_ok {
        return false;
    }

    !RESERVED_NAMES.contains(&name)
}

/// Custom element definition
pub struct CustomElementDefinition {
    name: String,
    constructor: Box<dyn ElementConstructor>,
    extends: Option<String>,
    observed_attributes: Vec<String>,
    form_associated: bool,
    disable_shadow: bool,
    disable_internals: bool,
}

impl CustomElementDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constructor(&self) -> &dyn ElementConstructor {
        self.constructor.as_ref()
    }

    /// Built-in element this definition customizes, if any
    pub fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    pub fn observed_attributes(&self) -> &[String] {
        &self.observed_attributes
    }

    pub fn observes(&self, attribute: &str) -> bool {
        self.observed_attributes.iter().any(|a| a == attribute)
    }

    pub fn form_associated(&self) -> bool {
        self.form_associated
    }

    pub fn disable_shadow(&self) -> bool {
        self.disable_shadow
    }

    pub fn disable_internals(&self) -> bool {
        self.disable_internals
    }
}

impl fmt::Debug for CustomElementDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomElementDefinition")
            .field("name", &self.name)
            .field("extends", &self.extends)
            .field("observed_attributes", &self.observed_attributes)
            .field("form_associated", &self.form_associated)
            .field("disable_shadow", &self.disable_shadow)
            .field("disable_internals", &self.disable_internals)
            .finish_non_exhaustive()
    }
}

/// Custom element options
#[derive(Debug, Clone, Default)]
pub struct ElementDefinitionOptions {
    pub extends: Option<String>,
    pub observed_attributes: Vec<String>,
    pub form_associated: bool,
    pub disable_shadow: bool,
    pub disable_internals: bool,
}

impl ElementDefinitionOptions {
    /// Options observing the given attributes
    pub fn observing<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            observed_attributes: attributes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Make this a customized built-in of `tag`
    pub fn extending(mut self, tag: &str) -> Self {
        self.extends = Some(tag.to_string());
        self
    }
}

#[derive(Default)]
struct WhenDefinedSlot {
    definition: Option<Rc<CustomElementDefinition>>,
    wakers: Vec<Waker>,
}

/// Future for whenDefined; resolves with the definition, never fails
pub struct WhenDefined {
    name: String,
    slot: Rc<RefCell<WhenDefinedSlot>>,
}

impl WhenDefined {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.slot.borrow().definition.is_some()
    }
}

impl Future for WhenDefined {
    type Output = Rc<CustomElementDefinition>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        if let Some(definition) = &slot.definition {
            return Poll::Ready(definition.clone());
        }
        if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl fmt::Debug for WhenDefined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenDefined")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Custom elements registry
#[derive(Default)]
pub struct CustomElementRegistry {
    definitions: HashMap<String, Rc<CustomElementDefinition>>,
    /// Names in registration order
    order: Vec<String>,
    when_defined: HashMap<String, Rc<RefCell<WhenDefinedSlot>>>,
    reserved: Vec<String>,
}

impl CustomElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that also rejects `reserved` names
    pub fn with_reserved_names(reserved: Vec<String>) -> Self {
        Self { reserved, ..Self::default() }
    }

    /// Define a custom element
    pub fn define(
        &mut self,
        name: &str,
        constructor: impl ElementConstructor + 'static,
        options: ElementDefinitionOptions,
    ) -> Result<Rc<CustomElementDefinition>, DefinitionError> {
        if !self.is_valid_name(name) {
            return Err(DefinitionError::InvalidName(name.to_string()));
        }

        if self.definitions.contains_key(name) {
            return Err(DefinitionError::AlreadyDefined(name.to_string()));
        }

        if let Some(extends) = &options.extends
            && !EXTENDABLE_ELEMENTS.contains(&extends.as_str())
        {
            return Err(DefinitionError::InvalidExtends(extends.clone()));
        }

        // Ordered set: keep the first occurrence of each name
        let mut observed_attributes: Vec<String> = Vec::with_capacity(options.observed_attributes.len());
        for attribute in options.observed_attributes {
            if !observed_attributes.contains(&attribute) {
                observed_attributes.push(attribute);
            }
        }

        let definition = Rc::new(CustomElementDefinition {
            name: name.to_string(),
            constructor: Box::new(constructor),
            extends: options.extends,
            observed_attributes,
            form_associated: options.form_associated,
            disable_shadow: options.disable_shadow,
            disable_internals: options.disable_internals,
        });

        self.definitions.insert(name.to_string(), definition.clone());
        self.order.push(name.to_string());
        tracing::info!("Defined custom element <{}>", name);

        // Resolve whenDefined futures
        if let Some(slot) = self.when_defined.remove(name) {
            let wakers = {
                let mut slot = slot.borrow_mut();
                slot.definition = Some(definition.clone());
                std::mem::take(&mut slot.wakers)
            };
            for waker in wakers {
                waker.wake();
            }
        }

        Ok(definition)
    }

    /// Get element definition
    pub fn lookup(&self, name: &str) -> Option<Rc<CustomElementDefinition>> {
        self.definitions.get(name).cloned()
    }

    /// Check if element is defined
    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Future resolved once `name` is defined
    pub fn when_defined(&mut self, name: &str) -> WhenDefined {
        let slot = match self.definitions.get(name) {
            Some(definition) => Rc::new(RefCell::new(WhenDefinedSlot {
                definition: Some(definition.clone()),
                wakers: Vec::new(),
            })),
            None => self.when_defined.entry(name.to_string()).or_default().clone(),
        };
        WhenDefined { name: name.to_string(), slot }
    }

    /// Defined names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn is_valid_name(&self, name: &str) -> bool {
        is_valid_custom_element_name(name) && !self.reserved.iter().any(|r| r == name)
    }
}

impl fmt::Debug for CustomElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomElementRegistry")
            .field("definitions", &self.order)
            .field("pending_when_defined", &self.when_defined.len())
            .field("reserved", &self.reserved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{CustomElement, ReactionContext};
    use crate::error::CallbackError;

    struct Empty;

    impl CustomElement for Empty {}

    struct EmptyConstructor;

    impl ElementConstructor for EmptyConstructor {
        fn construct(&self, _ctx: &mut ReactionContext<'_>) -> Result<Box<dyn CustomElement>, CallbackError> {
            Ok(Box::new(Empty))
        }
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_custom_element_name("my-element"));
        assert!(is_valid_custom_element_name("app-header"));
        assert!(is_valid_custom_element_name("x-badge"));
        assert!(is_valid_custom_element_name("h1-title-2"));
        assert!(is_valid_custom_element_name("a-"));
        assert!(!is_valid_custom_element_name("myelement")); // no hyphen
        assert!(!is_valid_custom_element_name("My-Element")); // uppercase
        assert!(!is_valid_custom_element_name("my-Element"));
        assert!(!is_valid_custom_element_name("1-element"));
        assert!(!is_valid_custom_element_name("-element"));
        assert!(!is_valid_custom_element_name("my_el-x"));
        assert!(!is_valid_custom_element_name(""));
        assert!(!is_valid_custom_element_name("font-face"));
        assert!(!is_valid_custom_element_name("missing-glyph"));
    }

    #[test]
    fn test_define() {
        let mut registry = CustomElementRegistry::new();

        assert!(registry.define("my-element", EmptyConstructor, ElementDefinitionOptions::default()).is_ok());
        assert!(registry.is_defined("my-element"));

        // Duplicate
        assert_eq!(
            registry
                .define("my-element", EmptyConstructor, ElementDefinitionOptions::default())
                .unwrap_err(),
            DefinitionError::AlreadyDefined("my-element".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_name_leaves_registry_unchanged() {
        let mut registry = CustomElementRegistry::new();

        for name in ["nohyphen", "annotation-xml", "Upper-case"] {
            assert_eq!(
                registry.define(name, EmptyConstructor, ElementDefinitionOptions::default()).unwrap_err(),
                DefinitionError::InvalidName(name.to_string())
            );
        }
        assert!(registry.is_empty());
        assert_eq!(registry.names().count(), 0);
    }

    #[test]
    fn test_configured_reserved_names() {
        let mut registry = CustomElementRegistry::with_reserved_names(vec!["app-shell".to_string()]);
        assert!(matches!(
            registry.define("app-shell", EmptyConstructor, ElementDefinitionOptions::default()),
            Err(DefinitionError::InvalidName(_))
        ));
        assert!(registry.define("app-main", EmptyConstructor, ElementDefinitionOptions::default()).is_ok());
    }

    #[test]
    fn test_extends_validation() {
        let mut registry = CustomElementRegistry::new();

        let ok = registry.define(
            "fancy-button",
            EmptyConstructor,
            ElementDefinitionOptions::default().extending("button"),
        );
        assert_eq!(ok.unwrap().extends(), Some("button"));

        let err = registry.define(
            "fancy-thing",
            EmptyConstructor,
            ElementDefinitionOptions::default().extending("my-widget"),
        );
        assert_eq!(err.unwrap_err(), DefinitionError::InvalidExtends("my-widget".to_string()));
        assert!(!registry.is_defined("fancy-thing"));
    }

    #[test]
    fn test_observed_attributes_deduplicated() {
        let mut registry = CustomElementRegistry::new();
        let definition = registry
            .define(
                "x-badge",
                EmptyConstructor,
                ElementDefinitionOptions::observing(["label", "color", "label"]),
            )
            .unwrap();

        assert_eq!(definition.observed_attributes(), ["label", "color"]);
        assert!(definition.observes("color"));
        assert!(!definition.observes("size"));
    }

    #[test]
    fn test_when_defined_already_defined() {
        let mut registry = CustomElementRegistry::new();
        registry.define("x-ready", EmptyConstructor, ElementDefinitionOptions::default()).unwrap();

        let future = registry.when_defined("x-ready");
        assert!(future.is_ready());
        let definition = smol::block_on(future);
        assert_eq!(definition.name(), "x-ready");
    }

    #[test]
    fn test_definition_shared_not_copied() {
        let mut registry = CustomElementRegistry::new();
        let defined = registry.define("x-one", EmptyConstructor, ElementDefinitionOptions::default()).unwrap();
        let looked_up = registry.lookup("x-one").unwrap();
        let awaited = smol::block_on(registry.when_defined("x-one"));

        assert!(Rc::ptr_eq(&defined, &looked_up));
        assert!(Rc::ptr_eq(&defined, &awaited));
        assert_eq!(Rc::strong_count(&defined), 4);
    }

    #[test]
    fn test_when_defined_resolves_on_define() {
        let mut registry = CustomElementRegistry::new();
        let first = registry.when_defined("x-later");
        let second = registry.when_defined("x-later");
        assert!(!first.is_ready());

        registry.define("x-later", EmptyConstructor, ElementDefinitionOptions::default()).unwrap();

        assert!(first.is_ready());
        assert_eq!(smol::block_on(first).name(), "x-later");
        assert_eq!(smol::block_on(second).name(), "x-later");
    }

    #[test]
    fn test_names_in_registration_order() {
        let mut registry = CustomElementRegistry::new();
        for name in ["z-last", "a-first", "m-middle"] {
            registry.define(name, EmptyConstructor, ElementDefinitionOptions::default()).unwrap();
        }
        assert_eq!(registry.names().collect::<Vec<_>>(), ["z-last", "a-first", "m-middle"]);
    }
}
