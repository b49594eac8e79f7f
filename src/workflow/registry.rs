//! Named collection of suites, in definition order

use indexmap::IndexMap;

use super::context::Context;
use super::error::ModelError;
use super::suite::{EcosystemSuite, TestSuite};

#[derive(Debug, Clone, Default)]
pub struct SuiteRegistry {
    suites: IndexMap<String, EcosystemSuite>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a suite under `key`, replacing any previous suite with that key
    pub fn insert(&mut self, key: impl Into<String>, suite: impl Into<EcosystemSuite>) {
        self.suites.insert(key.into(), suite.into());
    }

    pub fn get(&self, key: &str) -> Option<&EcosystemSuite> {
        self.suites.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.suites.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EcosystemSuite)> {
        self.suites.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Reify one suite. Unnamed suites take their registry key as name.
    pub async fn reify(&self, key: &str, ctx: &Context) -> Result<Option<TestSuite>, ModelError> {
        match self.suites.get(key) {
            Some(suite) => Ok(Some(name_after_key(key, suite.reify(ctx).await?))),
            None => Ok(None),
        }
    }

    /// Reify every suite against `ctx`, in definition order
    pub async fn reify_all(&self, ctx: &Context) -> Result<Vec<(String, TestSuite)>, ModelError> {
        let mut suites = Vec::with_capacity(self.suites.len());
        for (key, suite) in &self.suites {
            let reified = name_after_key(key, suite.reify(ctx).await?);
            suites.push((key.clone(), reified));
        }
        Ok(suites)
    }

    /// Find a suite by key, falling back to the reified suite name
    pub async fn find(
        &self,
        selector: &str,
        ctx: &Context,
    ) -> Result<Option<(String, TestSuite)>, ModelError> {
        if let Some(suite) = self.reify(selector, ctx).await? {
            return Ok(Some((selector.to_string(), suite)));
        }
        Ok(self
            .reify_all(ctx)
            .await?
            .into_iter()
            .find(|(_, suite)| suite.name.as_deref() == Some(selector)))
    }
}

fn name_after_key(key: &str, mut suite: TestSuite) -> TestSuite {
    if suite.name.is_none() {
        suite.name = Some(key.to_string());
    }
    suite
}
