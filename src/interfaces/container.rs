use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::error::ResolutionError;

/// A type-erased handle to a resolved service.
///
/// The payload is always an `Arc<S>`, so unsized services such as
/// `dyn Trait` can be stored and recovered without losing pointer identity.
///
/// Recovery matches the stored type exactly. A service stored as
/// `Arc<dyn Forward + Send + Sync>` does not come back as `Arc<dyn Forward>`
/// (or the other way round); store it under the type callers will ask for.
#[derive(Clone)]
pub struct Instance(Arc<dyn Any + Send + Sync>);

impl Instance {
    pub fn new<S>(service: Arc<S>) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
    {
        Instance(Arc::new(service))
    }

    pub fn downcast<S>(&self) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.0.downcast_ref::<Arc<S>>().cloned()
    }

    /// Like [`Instance::downcast`], reporting a mismatch against `key`.
    pub fn downcast_for<S>(&self, key: &str) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.downcast::<S>().ok_or_else(|| ResolutionError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<S>(),
        })
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Instance(..)")
    }
}

/// A registry mapping binding keys to services.
///
/// Scoping policy belongs to the implementation; callers only see
/// `resolve_any`, which may construct on first use.
pub trait Container: Send + Sync {
    fn resolve_any(&self, key: &str) -> Result<Instance, ResolutionError>;

    fn has(&self, key: &str) -> bool;

    /// Replace whatever is bound under `key` with an already built instance.
    fn instance_any(&self, key: &str, instance: Instance);

    fn resolve<S>(&self, key: &str) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        Self: Sized,
    {
        self.resolve_any(key)?.downcast_for::<S>(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_downcast_unsized() {
        let service: Arc<dyn Greeter> = Arc::new(English);
        let instance = Instance::new(Arc::clone(&service));

        let back = instance.downcast::<dyn Greeter>().unwrap();
        assert_eq!(back.greet(), "hello");
        assert!(Arc::ptr_eq(&back, &service));
    }

    #[test]
    fn test_downcast_is_exact() {
        let service: Arc<dyn Greeter + Send + Sync> = Arc::new(English);
        let instance = Instance::new(service);

        assert!(instance.downcast::<dyn Greeter>().is_none());
        assert!(instance.downcast::<dyn Greeter + Send + Sync>().is_some());
    }

    #[test]
    fn test_downcast_mismatch() {
        let instance = Instance::new(Arc::new(String::from("test")));
        assert!(instance.downcast::<i32>().is_none());

        let err = instance.downcast_for::<i32>("some.key").unwrap_err();
        match err {
            ResolutionError::TypeMismatch { key, expected } => {
                assert_eq!(key, "some.key");
                assert_eq!(expected, "i32");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
