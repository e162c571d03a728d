use crate::error::Error;
use crate::plugin_system::backend::bind_backend;
use kiln_plugin::Backend;
use std::sync::Arc;

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

trait Storage: Send + Sync {}

struct English;

impl Greeter for English {
    fn greet(&self) -> String {
        "hello".to_string()
    }
}

fn greeter_backend() -> Backend {
    let english = Arc::new(English);
    Backend::from_arc(english.clone()).with_capability::<dyn Greeter>(english)
}

#[test]
fn test_bind_exact_type() {
    let backend = greeter_backend();
    let mut dest: Option<Arc<English>> = None;
    bind_backend(&backend, &mut dest).unwrap();
    assert_eq!(dest.unwrap().greet(), "hello");
}

#[test]
fn test_bind_declared_capability() {
    let backend = greeter_backend();
    let mut dest: Option<Arc<dyn Greeter>> = None;
    bind_backend(&backend, &mut dest).unwrap();
    assert_eq!(dest.unwrap().greet(), "hello");
}

#[test]
fn test_bind_mismatch_names_both_types() {
    let backend = greeter_backend();
    let mut dest: Option<Arc<dyn Storage>> = None;

    match bind_backend(&backend, &mut dest) {
        Err(Error::TypeMismatch { expected, actual }) => {
            assert!(expected.contains("Storage"), "expected was {}", expected);
            assert!(actual.contains("English"), "actual was {}", actual);
        }
        other => panic!("expected type mismatch, got {:?}", other),
    }
    assert!(dest.is_none());
}

#[test]
fn test_bind_wrong_concrete_type() {
    let backend = Backend::new(7u64);
    let mut dest: Option<Arc<u32>> = None;
    let err = bind_backend(&backend, &mut dest).unwrap_err();
    assert_eq!(err.to_string(), "invalid type, expected u32 and received u64");
}
