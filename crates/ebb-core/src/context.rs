#![forbid(unsafe_code)]

//! Type-indexed service environment.
//!
//! A [`Context`] is an immutable mapping from service keys to shared
//! service values; a [`Tag`] is the typed key naming one slot. Contexts are
//! cheap to copy and combine: `add` and `merge` return new maps, existing
//! contexts are never mutated. Services are stored as
//! `Arc<dyn Any + Send + Sync>`, so whoever built the service keeps
//! ownership and every reader shares it.

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed key naming a service slot in a [`Context`].
///
/// Tags are value objects: two tags are the same slot iff their keys match.
/// [`Tag::of`] keys the slot by the service's type name (the stable choice
/// for a service with one canonical binding); [`Tag::named`] creates a
/// distinct slot for services that need several bindings of one type.
pub struct Tag<S> {
    key: Cow<'static, str>,
    _marker: PhantomData<fn() -> S>,
}

impl<S: 'static> Tag<S> {
    /// A tag keyed by the service type's name.
    #[must_use]
    pub fn of() -> Self {
        Self {
            key: Cow::Borrowed(type_name::<S>()),
            _marker: PhantomData,
        }
    }

    /// A tag with an explicit key.
    pub fn named(key: impl Into<String>) -> Self {
        Self {
            key: Cow::Owned(key.into()),
            _marker: PhantomData,
        }
    }

    /// The stable key for this slot.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<S> Clone for Tag<S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S> PartialEq for Tag<S> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<S> Eq for Tag<S> {}

impl<S> fmt::Debug for Tag<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag").field("key", &self.key).finish()
    }
}

impl<S> fmt::Display for Tag<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// The error reported when a context has no binding for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNotFound {
    key: String,
}

impl ServiceNotFound {
    /// The missing key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ServiceNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service not found: {}", self.key)
    }
}

impl std::error::Error for ServiceNotFound {}

/// An immutable service environment.
#[derive(Clone, Default)]
pub struct Context {
    services: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Context {
    /// The empty context.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A new context with `service` bound under `tag`. `self` is unchanged.
    #[must_use]
    pub fn add<S: Any + Send + Sync>(&self, tag: &Tag<S>, service: S) -> Self {
        self.add_shared(tag, Arc::new(service))
    }

    /// A new context binding an already-shared service under `tag`.
    #[must_use]
    pub fn add_shared<S: Any + Send + Sync>(&self, tag: &Tag<S>, service: Arc<S>) -> Self {
        let mut services = self.services.clone();
        services.insert(tag.key().to_string(), service);
        Self { services }
    }

    /// A new context with `overlay`'s bindings layered over `self`'s.
    /// Keys present in both resolve to the overlay.
    #[must_use]
    pub fn merge(&self, overlay: &Self) -> Self {
        let mut services = self.services.clone();
        for (key, service) in &overlay.services {
            services.insert(key.clone(), Arc::clone(service));
        }
        Self { services }
    }

    /// Look up the service bound under `tag`.
    pub fn get<S: Any + Send + Sync>(&self, tag: &Tag<S>) -> Result<Arc<S>, ServiceNotFound> {
        let service = self.get_raw(tag.key()).ok_or_else(|| ServiceNotFound {
            key: tag.key().to_string(),
        })?;
        service.downcast::<S>().map_err(|_| ServiceNotFound {
            key: tag.key().to_string(),
        })
    }

    /// Look up a service slot by key, untyped.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.services.get(key).map(Arc::clone)
    }

    /// `true` iff a binding exists for `tag`.
    #[must_use]
    pub fn contains<S: Any + Send + Sync>(&self, tag: &Tag<S>) -> bool {
        self.services.contains_key(tag.key())
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// `true` iff no bindings exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.services.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Config {
        value: String,
    }

    #[test]
    fn add_then_get() {
        let tag = Tag::<Config>::of();
        let ctx = Context::empty().add(
            &tag,
            Config {
                value: "hello".into(),
            },
        );
        let cfg = ctx.get(&tag).unwrap();
        assert_eq!(cfg.value, "hello");
    }

    #[test]
    fn add_does_not_mutate_the_original() {
        let tag = Tag::<Config>::of();
        let base = Context::empty();
        let _extended = base.add(&tag, Config { value: "x".into() });
        assert!(base.is_empty());
    }

    #[test]
    fn missing_key_reports_service_not_found() {
        let tag = Tag::<Config>::named("missing");
        let err = Context::empty().get(&tag).unwrap_err();
        assert_eq!(err.key(), "missing");
        assert!(format!("{err}").contains("missing"));
    }

    #[test]
    fn merge_prefers_the_overlay() {
        let tag = Tag::<Config>::named("cfg");
        let base = Context::empty().add(&tag, Config { value: "old".into() });
        let overlay = Context::empty().add(&tag, Config { value: "new".into() });
        let merged = base.merge(&overlay);
        assert_eq!(merged.get(&tag).unwrap().value, "new");
        // base untouched
        assert_eq!(base.get(&tag).unwrap().value, "old");
    }

    #[test]
    fn merge_keeps_disjoint_bindings() {
        let a = Tag::<Config>::named("a");
        let b = Tag::<Config>::named("b");
        let left = Context::empty().add(&a, Config { value: "1".into() });
        let right = Context::empty().add(&b, Config { value: "2".into() });
        let merged = left.merge(&right);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&a));
        assert!(merged.contains(&b));
    }

    #[test]
    fn tags_equal_iff_keys_match() {
        let a = Tag::<Config>::named("same");
        let b = Tag::<Config>::named("same");
        let c = Tag::<Config>::named("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn typed_tags_share_the_type_key() {
        let a = Tag::<Config>::of();
        let b = Tag::<Config>::of();
        assert_eq!(a, b);
    }

    #[test]
    fn shared_services_are_not_cloned() {
        let tag = Tag::<Config>::named("shared");
        let service = Arc::new(Config { value: "s".into() });
        let ctx = Context::empty().add_shared(&tag, Arc::clone(&service));
        let got = ctx.get(&tag).unwrap();
        assert!(Arc::ptr_eq(&service, &got));
    }

    #[test]
    fn wrong_type_for_key_is_not_found() {
        let string_tag = Tag::<String>::named("slot");
        let config_tag = Tag::<Config>::named("slot");
        let ctx = Context::empty().add(&string_tag, "text".to_string());
        assert!(ctx.get(&config_tag).is_err());
    }
}
