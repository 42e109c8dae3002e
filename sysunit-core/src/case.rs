//! System test cases: named, ordered sets of TBean factories.

use std::sync::Arc;
use sysunit_types::TBeanId;

use crate::error::{BoxError, InvalidFactory};
use crate::tbean::{FnTBean, TBean};

/// Produces a fresh TBean instance each time a case is started.
pub trait TBeanFactory: Send + Sync {
    /// Create the TBean.
    fn create(&self) -> Result<Box<dyn TBean>, BoxError>;
}

impl<F> TBeanFactory for F
where
    F: Fn() -> Result<Box<dyn TBean>, BoxError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn TBean>, BoxError> {
        self()
    }
}

/// Factory that turns a shared closure into a TBean ("thread method").
struct ThreadFactory<F> {
    work: Arc<F>,
}

impl<F> TBeanFactory for ThreadFactory<F>
where
    F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn create(&self) -> Result<Box<dyn TBean>, BoxError> {
        let work = Arc::clone(&self.work);
        Ok(Box::new(FnTBean::new(move || work())))
    }
}

/// A system test case.
///
/// Factory names become TBean ids, so they must be unique within a case.
/// Factories run in registration order when the case is started.
#[derive(Clone)]
pub struct SystemTestCase {
    name: String,
    factories: Vec<(TBeanId, Arc<dyn TBeanFactory>)>,
}

impl SystemTestCase {
    /// Create an empty case.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factories: Vec::new(),
        }
    }

    /// The case name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a factory under `name`.
    pub fn add_factory<F>(
        &mut self,
        name: impl Into<TBeanId>,
        factory: F,
    ) -> Result<&mut Self, InvalidFactory>
    where
        F: TBeanFactory + 'static,
    {
        let name = name.into();
        self.verify_name(&name)?;
        self.factories.push((name, Arc::new(factory)));
        Ok(self)
    }

    /// Register a closure that is run as the body of a TBean.
    pub fn add_thread<F>(
        &mut self,
        name: impl Into<TBeanId>,
        work: F,
    ) -> Result<&mut Self, InvalidFactory>
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_factory(
            name,
            ThreadFactory {
                work: Arc::new(work),
            },
        )
    }

    fn verify_name(&self, name: &TBeanId) -> Result<(), InvalidFactory> {
        if name.as_str().is_empty() {
            return Err(InvalidFactory::EmptyName);
        }
        if self.factories.iter().any(|(existing, _)| existing == name) {
            return Err(InvalidFactory::Duplicate { name: name.clone() });
        }
        Ok(())
    }

    /// Factory names in registration order.
    pub fn tbean_factory_names(&self) -> Vec<&TBeanId> {
        self.factories.iter().map(|(name, _)| name).collect()
    }

    /// Factories in registration order.
    pub fn tbean_factories(&self) -> impl Iterator<Item = (&TBeanId, &Arc<dyn TBeanFactory>)> {
        self.factories.iter().map(|(name, factory)| (name, factory))
    }

    /// Look up a factory by name.
    pub fn tbean_factory(&self, name: &str) -> Option<&Arc<dyn TBeanFactory>> {
        self.factories
            .iter()
            .find(|(id, _)| id.as_str() == name)
            .map(|(_, factory)| factory)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the case has no factories.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for SystemTestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemTestCase")
            .field("name", &self.name)
            .field("factories", &self.tbean_factory_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_factory() -> Result<Box<dyn TBean>, BoxError> {
        Ok(Box::new(FnTBean::new(|| Ok(()))))
    }

    #[test]
    fn bare_case_is_empty() {
        let case = SystemTestCase::new("bare");
        assert!(case.is_empty());
        assert!(case.tbean_factory_names().is_empty());
        assert_eq!(case.tbean_factories().count(), 0);
    }

    #[test]
    fn thread_factory_is_registered() {
        let mut case = SystemTestCase::new("single");
        case.add_thread("One", || Ok(())).unwrap();

        assert_eq!(case.len(), 1);
        assert_eq!(case.tbean_factory_names(), vec![&TBeanId::new("One")]);

        let (_, first) = case.tbean_factories().next().unwrap();
        let looked_up = case.tbean_factory("One").unwrap();
        assert!(Arc::ptr_eq(first, looked_up));
    }

    #[test]
    fn closure_factory_is_registered() {
        let mut case = SystemTestCase::new("single");
        case.add_factory("One", noop_factory).unwrap();

        let tbean = case.tbean_factory("One").unwrap().create();
        assert!(tbean.is_ok());
        assert!(case.tbean_factory("Two").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut case = SystemTestCase::new("dupes");
        case.add_thread("Cheese", || Ok(())).unwrap();

        let err = case.add_factory("Cheese", noop_factory).unwrap_err();
        assert_eq!(
            err,
            InvalidFactory::Duplicate {
                name: TBeanId::new("Cheese")
            }
        );
        assert_eq!(case.len(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut case = SystemTestCase::new("empty");
        assert_eq!(
            case.add_thread("", || Ok(())).unwrap_err(),
            InvalidFactory::EmptyName
        );
    }

    #[test]
    fn registration_order_is_kept() {
        let mut case = SystemTestCase::new("order");
        case.add_thread("Two", || Ok(()))
            .unwrap()
            .add_thread("One", || Ok(()))
            .unwrap();

        let names: Vec<&str> = case
            .tbean_factory_names()
            .into_iter()
            .map(TBeanId::as_str)
            .collect();
        assert_eq!(names, vec!["Two", "One"]);
    }

    #[test]
    fn thread_factory_creates_fresh_instances() {
        let mut case = SystemTestCase::new("fresh");
        case.add_thread("One", || Err("always fails".into())).unwrap();

        let factory = case.tbean_factory("One").unwrap();
        let mut a = factory.create().unwrap();
        let mut b = factory.create().unwrap();
        assert!(a.run().is_err());
        assert!(b.run().is_err());
    }
}
