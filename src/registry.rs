//! Purpose: Hold the name → handler table consulted by `CMD` lines.
//! Exports: `Handler`, `HandlerRegistry`, `Plugin`.
//! Role: Explicit replacement for runtime method lookup; plugins register into it at startup.
//! Invariants: Names are case-sensitive; later registrations replace earlier ones.
//! Invariants: The registry is only read once the command loop starts.
//! Invariants: A panicking handler is reported as a handler error, never unwound into the loop.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::protocol::Outcome;

type HandlerFn = dyn Fn(&Value) -> Result<Outcome, Error>;

/// A named capability invoked with the current event.
pub struct Handler {
    origin: String,
    run: Box<HandlerFn>,
}

impl Handler {
    /// `origin` names the plugin that defined the handler; it only feeds diagnostics.
    pub fn new(
        origin: impl Into<String>,
        run: impl Fn(&Value) -> Result<Outcome, Error> + 'static,
    ) -> Self {
        Self {
            origin: origin.into(),
            run: Box::new(run),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn call(&self, event: &Value) -> Result<Outcome, Error> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.run)(event))) {
            Ok(result) => result,
            Err(_) => Err(Error::new(ErrorKind::Handler).with_message("handler panicked")),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Handler>,
    journal: Vec<String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, returning the handler it replaced.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) -> Option<Handler> {
        let name = name.into();
        let origin = handler.origin().to_string();
        self.journal.push(name.clone());
        let replaced = self.handlers.insert(name.clone(), handler);
        match &replaced {
            Some(previous) => warn!(
                handler = %name,
                previous = %previous.origin(),
                current = %origin,
                "handler redefined; later plugin wins"
            ),
            None => debug!(handler = %name, plugin = %origin, "handler registered"),
        }
        replaced
    }

    pub fn register_fn(
        &mut self,
        name: impl Into<String>,
        origin: impl Into<String>,
        run: impl Fn(&Value) -> Result<Outcome, Error> + 'static,
    ) -> Option<Handler> {
        self.register(name, Handler::new(origin, run))
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Resolves and runs a handler. Unknown names are `NotFound`; failures
    /// inside the handler keep whatever kind the handler reported.
    pub fn invoke(&self, name: &str, event: &Value) -> Result<Outcome, Error> {
        let handler = self.get(name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("no such handler")
                .with_handler(name)
        })?;
        handler.call(event).map_err(|err| {
            if err.handler().is_some() {
                err
            } else {
                err.with_handler(name)
            }
        })
    }

    /// Number of `register` calls made so far, replacements included.
    pub fn registration_count(&self) -> usize {
        self.journal.len()
    }

    /// Names registered after `mark` (a prior `registration_count`), in call order.
    pub fn registered_since(&self, mark: usize) -> impl Iterator<Item = &str> {
        self.journal
            .get(mark..)
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
    }

    /// Handler names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A unit that contributes handlers to a registry.
///
/// Script files loaded from the plugin directory and native Rust plugins
/// both go through this entry point, so load order is whatever order the
/// loader calls `register` in.
pub trait Plugin {
    fn name(&self) -> &str;

    fn register(&self, registry: &mut HandlerRegistry) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::{HandlerRegistry, Plugin};
    use crate::core::error::{Error, ErrorKind};
    use crate::protocol::Outcome;
    use serde_json::{Value, json};

    struct Clicks;

    impl Plugin for Clicks {
        fn name(&self) -> &str {
            "clicks"
        }

        fn register(&self, registry: &mut HandlerRegistry) -> Result<(), Error> {
            registry.register_fn("isClick", self.name(), |event: &Value| {
                Ok(Outcome::from_truthy(event["type"] == "click"))
            });
            Ok(())
        }
    }

    #[test]
    fn plugin_registers_named_handlers() {
        let mut registry = HandlerRegistry::new();
        Clicks.register(&mut registry).unwrap();

        assert!(registry.contains("isClick"));
        assert!(!registry.contains("isclick"));
        assert_eq!(
            registry.invoke("isClick", &json!({"type": "click"})).unwrap(),
            Outcome::True
        );
        assert_eq!(
            registry.invoke("isClick", &json!({"type": "key"})).unwrap(),
            Outcome::False
        );
    }

    #[test]
    fn later_registration_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("check", "a", |_: &Value| Ok(Outcome::False));
        let replaced = registry.register_fn("check", "b", |_: &Value| Ok(Outcome::True));

        assert_eq!(replaced.map(|h| h.origin().to_string()), Some("a".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("check").unwrap().origin(), "b");
        assert_eq!(registry.invoke("check", &json!(null)).unwrap(), Outcome::True);
    }

    #[test]
    fn unknown_handler_is_not_found() {
        let registry = HandlerRegistry::new();
        let err = registry.invoke("missing", &json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.handler(), Some("missing"));
    }

    #[test]
    fn failing_and_panicking_handlers_are_errors() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("fails", "test", |_: &Value| {
            Err(Error::new(ErrorKind::Handler).with_message("boom"))
        });
        registry.register_fn("panics", "test", |_: &Value| -> Result<Outcome, Error> {
            panic!("handler bug")
        });

        let err = registry.invoke("fails", &json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert_eq!(err.handler(), Some("fails"));

        let err = registry.invoke("panics", &json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert_eq!(err.message(), Some("handler panicked"));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("b", "t", |_: &Value| Ok(Outcome::None));
        registry.register_fn("a", "t", |_: &Value| Ok(Outcome::None));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn registered_since_lists_calls_after_mark() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("a", "first", |_: &Value| Ok(Outcome::True));
        let mark = registry.registration_count();
        registry.register_fn("b", "second", |_: &Value| Ok(Outcome::True));
        registry.register_fn("a", "second", |_: &Value| Ok(Outcome::False));

        assert_eq!(registry.registered_since(mark).collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(registry.registered_since(99).next().is_none());
        assert_eq!(registry.len(), 2);
    }
}
