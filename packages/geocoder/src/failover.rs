//! Ordered provider failover chain.
//!
//! Providers are tried in registry priority order. For geocode, reverse,
//! and place details, the first provider that answers without an error
//! wins — including a `None` "no results" answer, which is a terminal
//! success. Autocomplete additionally advances past empty suggestion
//! lists, because suggestion quality varies widely across providers and
//! an empty list from a weak provider is often rescued by the next.
//! Validation advances past both errors and `valid = false`.
//!
//! The chain itself implements [`GeocodingProvider`], so callers hold a
//! single trait object whether one provider or six are configured.
//! Dropping the returned future between provider calls cancels the
//! remaining attempts.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::{
    AutocompleteOptions, GeocodeError, GeocodingProvider, GeocodingResult, Suggestion,
    ValidationResult,
};

/// An ordered, non-empty sequence of named providers. Immutable after
/// construction.
pub struct FailoverChain {
    providers: Vec<(String, Box<dyn GeocodingProvider>)>,
    /// Count of individual provider failures the chain has advanced
    /// past (or exhausted on).
    upstream_failures: AtomicU64,
}

impl FailoverChain {
    /// Builds a chain from `(name, provider)` pairs in execution order.
    ///
    /// # Panics
    ///
    /// Panics if `providers` is empty; the registry always supplies at
    /// least the mock provider.
    #[must_use]
    pub fn new(providers: Vec<(String, Box<dyn GeocodingProvider>)>) -> Self {
        assert!(!providers.is_empty(), "failover chain cannot be empty");
        Self {
            providers,
            upstream_failures: AtomicU64::new(0),
        }
    }

    /// Total provider failures observed across all operations.
    #[must_use]
    pub fn upstream_failure_count(&self) -> u64 {
        self.upstream_failures.load(Ordering::Relaxed)
    }

    fn record_failure(&self, name: &str, operation: &str, error: &GeocodeError) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
        log::warn!("provider {name} {operation} failed: {error}");
    }

    /// Returns the provider names in execution order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of providers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if the chain holds no providers. Always `false`
    /// for a constructed chain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn all_failed(provider: &str, error: GeocodeError) -> GeocodeError {
        GeocodeError::AllProvidersFailed {
            provider: provider.to_string(),
            source: Box::new(error),
        }
    }
}

#[async_trait]
impl GeocodingProvider for FailoverChain {
    fn name(&self) -> &str {
        "failover"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>, GeocodeError> {
        let mut last: Option<(&str, GeocodeError)> = None;

        for (name, provider) in &self.providers {
            match provider.geocode(address).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    self.record_failure(name, "geocode", &e);
                    last = Some((name, e));
                }
            }
        }

        let (name, error) = last.expect("chain is non-empty");
        Err(Self::all_failed(name, error))
    }

    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        let mut last: Option<(&str, GeocodeError)> = None;

        for (name, provider) in &self.providers {
            match provider.reverse_geocode(latitude, longitude).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    self.record_failure(name, "reverse geocode", &e);
                    last = Some((name, e));
                }
            }
        }

        let (name, error) = last.expect("chain is non-empty");
        Err(Self::all_failed(name, error))
    }

    async fn autocomplete(
        &self,
        input: &str,
        options: &AutocompleteOptions,
    ) -> Result<Vec<Suggestion>, GeocodeError> {
        let mut last: Option<(&str, GeocodeError)> = None;
        let mut any_succeeded = false;

        for (name, provider) in &self.providers {
            match provider.autocomplete(input, options).await {
                Ok(suggestions) if !suggestions.is_empty() => return Ok(suggestions),
                Ok(_) => {
                    // Empty list is not terminal for autocomplete; the
                    // next provider may do better.
                    any_succeeded = true;
                }
                Err(e) => {
                    self.record_failure(name, "autocomplete", &e);
                    last = Some((name, e));
                }
            }
        }

        if any_succeeded {
            return Ok(Vec::new());
        }

        let (name, error) = last.expect("chain is non-empty");
        Err(Self::all_failed(name, error))
    }

    async fn place_details(
        &self,
        place_id: &str,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        let mut last: Option<(&str, GeocodeError)> = None;

        for (name, provider) in &self.providers {
            match provider.place_details(place_id).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    self.record_failure(name, "place details", &e);
                    last = Some((name, e));
                }
            }
        }

        let (name, error) = last.expect("chain is non-empty");
        Err(Self::all_failed(name, error))
    }

    async fn validate_address(&self, address: &str) -> Result<ValidationResult, GeocodeError> {
        for (name, provider) in &self.providers {
            match provider.validate_address(address).await {
                Ok(validation) if validation.valid => return Ok(validation),
                Ok(_) => {}
                Err(e) => {
                    self.record_failure(name, "validation", &e);
                }
            }
        }

        Ok(ValidationResult {
            valid: false,
            normalized: None,
            issues: vec!["Address could not be validated by any provider".to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Scripted test provider: counts calls and plays a fixed role.
    struct Scripted {
        calls: Arc<AtomicUsize>,
        behavior: Behavior,
    }

    enum Behavior {
        Fails,
        Empty,
        Found,
        Slow(Duration),
    }

    impl Scripted {
        fn new(behavior: Behavior) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                    behavior,
                },
                calls,
            )
        }

        fn result() -> GeocodingResult {
            GeocodingResult {
                formatted_address: "somewhere".to_string(),
                latitude: 1.0,
                longitude: 2.0,
                provider: "scripted".to_string(),
                ..GeocodingResult::default()
            }
        }

        async fn play(&self) -> Result<Option<GeocodingResult>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Fails => Err(GeocodeError::Provider {
                    message: "scripted failure".to_string(),
                }),
                Behavior::Empty => Ok(None),
                Behavior::Found => Ok(Some(Self::result())),
                Behavior::Slow(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(Some(Self::result()))
                }
            }
        }
    }

    #[async_trait]
    impl GeocodingProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn geocode(&self, _address: &str) -> Result<Option<GeocodingResult>, GeocodeError> {
            self.play().await
        }

        async fn reverse_geocode(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<Option<GeocodingResult>, GeocodeError> {
            self.play().await
        }

        async fn autocomplete(
            &self,
            _input: &str,
            _options: &AutocompleteOptions,
        ) -> Result<Vec<Suggestion>, GeocodeError> {
            Ok(self
                .play()
                .await?
                .map(|result| {
                    vec![Suggestion {
                        description: result.formatted_address,
                        place_id: None,
                        place_types: Vec::new(),
                    }]
                })
                .unwrap_or_default())
        }

        async fn place_details(
            &self,
            _place_id: &str,
        ) -> Result<Option<GeocodingResult>, GeocodeError> {
            self.play().await
        }

        async fn validate_address(
            &self,
            _address: &str,
        ) -> Result<ValidationResult, GeocodeError> {
            Ok(self
                .play()
                .await?
                .map_or(
                    ValidationResult {
                        valid: false,
                        normalized: None,
                        issues: vec!["not found".to_string()],
                    },
                    |result| ValidationResult {
                        valid: true,
                        normalized: Some(result),
                        issues: Vec::new(),
                    },
                ))
        }
    }

    fn chain_of(providers: Vec<(&str, Scripted)>) -> FailoverChain {
        FailoverChain::new(
            providers
                .into_iter()
                .map(|(name, p)| (name.to_string(), Box::new(p) as Box<dyn GeocodingProvider>))
                .collect(),
        )
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let (a, a_calls) = Scripted::new(Behavior::Found);
        let (b, b_calls) = Scripted::new(Behavior::Found);
        let chain = chain_of(vec![("a", a), ("b", b)]);

        let result = chain.geocode("x").await.unwrap();
        assert!(result.is_some());
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_answer_is_terminal_for_geocode() {
        // A errors, B answers "no results", C must never run.
        let (a, _) = Scripted::new(Behavior::Fails);
        let (b, _) = Scripted::new(Behavior::Empty);
        let (c, c_calls) = Scripted::new(Behavior::Found);
        let chain = chain_of(vec![("a", a), ("b", b), ("c", c)]);

        let result = chain.geocode("x").await.unwrap();
        assert!(result.is_none());
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_answer_is_terminal_for_place_details() {
        let (a, _) = Scripted::new(Behavior::Fails);
        let (b, _) = Scripted::new(Behavior::Empty);
        let (c, c_calls) = Scripted::new(Behavior::Found);
        let chain = chain_of(vec![("a", a), ("b", b), ("c", c)]);

        assert!(chain.place_details("id").await.unwrap().is_none());
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_list_advances_for_autocomplete() {
        // Same script as above, but autocomplete advances past B's empty
        // list and C answers.
        let (a, _) = Scripted::new(Behavior::Fails);
        let (b, _) = Scripted::new(Behavior::Empty);
        let (c, c_calls) = Scripted::new(Behavior::Found);
        let chain = chain_of(vec![("a", a), ("b", b), ("c", c)]);

        let suggestions = chain
            .autocomplete("x", &AutocompleteOptions::default())
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_empty_autocomplete_returns_empty_not_error() {
        let (a, _) = Scripted::new(Behavior::Empty);
        let (b, _) = Scripted::new(Behavior::Fails);
        let chain = chain_of(vec![("a", a), ("b", b)]);

        let suggestions = chain
            .autocomplete("x", &AutocompleteOptions::default())
            .await
            .unwrap();
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn failing_provider_rescued_by_next_counts_one_failure() {
        let (a, _) = Scripted::new(Behavior::Fails);
        let (b, _) = Scripted::new(Behavior::Found);
        let chain = chain_of(vec![("always_fails", a), ("mock", b)]);

        let result = chain.geocode("x").await.unwrap();
        assert!(result.is_some());
        assert_eq!(chain.upstream_failure_count(), 1);
    }

    #[tokio::test]
    async fn all_failed_names_last_provider() {
        let (a, _) = Scripted::new(Behavior::Fails);
        let (b, _) = Scripted::new(Behavior::Fails);
        let chain = chain_of(vec![("a", a), ("last_one", b)]);

        let error = chain.geocode("x").await.unwrap_err();
        match error {
            GeocodeError::AllProvidersFailed { provider, .. } => {
                assert_eq!(provider, "last_one");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn validation_advances_past_invalid() {
        let (a, _) = Scripted::new(Behavior::Empty); // -> valid=false
        let (b, b_calls) = Scripted::new(Behavior::Found); // -> valid=true
        let chain = chain_of(vec![("a", a), ("b", b)]);

        let validation = chain.validate_address("x").await.unwrap();
        assert!(validation.valid);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_reports_unvalidatable() {
        let (a, _) = Scripted::new(Behavior::Fails);
        let (b, _) = Scripted::new(Behavior::Empty);
        let chain = chain_of(vec![("a", a), ("b", b)]);

        let validation = chain.validate_address("x").await.unwrap();
        assert!(!validation.valid);
        assert_eq!(
            validation.issues,
            vec!["Address could not be validated by any provider".to_string()]
        );
    }

    #[tokio::test]
    async fn dropping_the_future_cancels_remaining_providers() {
        // A stalls long enough that the caller gives up; B must never
        // be invoked once the future is dropped.
        let (a, _) = Scripted::new(Behavior::Slow(Duration::from_secs(5)));
        let (b, b_calls) = Scripted::new(Behavior::Found);
        let chain = chain_of(vec![("a", a), ("b", b)]);

        let result =
            tokio::time::timeout(Duration::from_millis(50), chain.geocode("x")).await;
        assert!(result.is_err(), "expected the caller timeout to win");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }
}
