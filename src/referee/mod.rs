//! Answer validation.
//!
//! The gateway walks an ordered list of arbiters, each with its own timeout,
//! and returns the first mask that comes back. It never fails: when every
//! tier errors the mask is all-invalid, and the default chain always ends in
//! the offline [`HeuristicArbiter`].

mod heuristic;
pub mod parse;
pub mod prompt;

use crate::llm::{ArbiterConfig, GenerateRequest, LlmError, LlmManager, LlmProvider, ModelRef};
use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use heuristic::{first_letter_mask, HeuristicArbiter};

/// Why a single tier attempt failed
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("arbiter timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed arbiter response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Provider(#[from] LlmError),
}

/// Anything that can turn a round's answers into a validation mask
#[async_trait]
pub trait Arbiter: Send + Sync {
    async fn attempt(
        &self,
        inputs: &FrozenInputs,
        letter: char,
    ) -> Result<ValidationMask, ArbiterError>;

    /// Label used in logs and in round results
    fn name(&self) -> String;
}

/// Arbiter backed by a chat model
pub struct LlmArbiter {
    provider: Arc<dyn LlmProvider>,
    model: ModelRef,
    timeout: Duration,
    max_tokens: u32,
}

impl LlmArbiter {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: ModelRef,
        timeout: Duration,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model,
            timeout,
            max_tokens,
        }
    }
}

#[async_trait]
impl Arbiter for LlmArbiter {
    async fn attempt(
        &self,
        inputs: &FrozenInputs,
        letter: char,
    ) -> Result<ValidationMask, ArbiterError> {
        let request = GenerateRequest {
            system_prompt: prompt::REFEREE_SYSTEM_PROMPT.to_string(),
            prompt: prompt::build_prompt(inputs, letter),
            max_tokens: Some(self.max_tokens),
            timeout: self.timeout,
            model_override: Some(self.model.model.clone()),
            json_mode: true,
        };

        let response = self.provider.generate(request).await?;
        tracing::debug!(
            "Arbiter {} answered in {}ms: {}",
            self.model,
            response.metadata.latency_ms,
            response.text
        );

        parse::parse_mask(&response.text, inputs)
    }

    fn name(&self) -> String {
        self.model.to_string()
    }
}

/// One step of the fallback chain
pub struct Tier {
    pub arbiter: Arc<dyn Arbiter>,
    pub timeout: Duration,
}

impl Tier {
    pub fn new(arbiter: Arc<dyn Arbiter>, timeout: Duration) -> Self {
        Self { arbiter, timeout }
    }
}

/// What the gateway produced for a round
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub mask: ValidationMask,
    /// Name of the arbiter whose verdicts were used
    pub validator: String,
    /// True when the first tier did not produce the mask
    pub degraded: bool,
}

pub struct ValidationGateway {
    tiers: Vec<Tier>,
}

impl ValidationGateway {
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    /// A gateway that only applies the first-letter rule
    pub fn offline() -> Self {
        Self::new(vec![Tier::new(
            Arc::new(HeuristicArbiter),
            Duration::from_secs(1),
        )])
    }

    /// Build the configured chain: primary model, secondary model, heuristic
    pub fn from_config(config: &ArbiterConfig, manager: &LlmManager) -> Self {
        let mut tiers = Vec::new();

        for (raw, timeout) in [
            (&config.primary, config.primary_timeout),
            (&config.secondary, config.secondary_timeout),
        ] {
            let model = match ModelRef::parse(raw) {
                Ok(model) => model,
                Err(e) => {
                    tracing::warn!("Skipping arbiter tier: {}", e);
                    continue;
                }
            };
            match manager.provider(&model.provider) {
                Some(provider) => {
                    tracing::info!("Arbiter tier {} ({:?} timeout)", model, timeout);
                    tiers.push(Tier::new(
                        Arc::new(LlmArbiter::new(provider, model, timeout, config.max_tokens)),
                        timeout,
                    ));
                }
                None => {
                    tracing::warn!(
                        "Skipping arbiter tier {}: provider '{}' is not configured",
                        model,
                        model.provider
                    );
                }
            }
        }

        tiers.push(Tier::new(Arc::new(HeuristicArbiter), Duration::from_secs(1)));
        Self::new(tiers)
    }

    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.arbiter.name()).collect()
    }

    /// Validate a round's answers. Degrades through the tiers instead of failing.
    pub async fn validate(&self, inputs: &FrozenInputs, letter: char) -> ValidationOutcome {
        if inputs.is_empty() {
            return ValidationOutcome {
                mask: ValidationMask::new(),
                validator: "none".to_string(),
                degraded: false,
            };
        }

        for (index, tier) in self.tiers.iter().enumerate() {
            let name = tier.arbiter.name();
            let result = match tokio::time::timeout(tier.timeout, tier.arbiter.attempt(inputs, letter))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ArbiterError::Timeout(tier.timeout)),
            };

            match result {
                Ok(mask) => {
                    if index > 0 {
                        tracing::info!("Round for letter {} graded by fallback {}", letter, name);
                    }
                    return ValidationOutcome {
                        mask: complete_mask(mask, inputs),
                        validator: name,
                        degraded: index > 0,
                    };
                }
                Err(e) => {
                    tracing::warn!("Arbiter {} failed: {}", name, e);
                }
            }
        }

        tracing::error!("All arbiter tiers failed for letter {}, rejecting every answer", letter);
        ValidationOutcome {
            mask: complete_mask(ValidationMask::new(), inputs),
            validator: "none".to_string(),
            degraded: true,
        }
    }
}

/// Restrict a mask to the players that were asked about, filling gaps with invalid
fn complete_mask(mut mask: ValidationMask, inputs: &FrozenInputs) -> ValidationMask {
    inputs
        .keys()
        .map(|player_id| {
            let mut verdicts = all_invalid();
            if let Some(given) = mask.remove(player_id) {
                verdicts.extend(given);
            }
            (player_id.clone(), verdicts)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingArbiter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Arbiter for FailingArbiter {
        async fn attempt(&self, _: &FrozenInputs, _: char) -> Result<ValidationMask, ArbiterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ArbiterError::Malformed("nope".to_string()))
        }

        fn name(&self) -> String {
            "failing".to_string()
        }
    }

    struct HangingArbiter;

    #[async_trait]
    impl Arbiter for HangingArbiter {
        async fn attempt(&self, _: &FrozenInputs, _: char) -> Result<ValidationMask, ArbiterError> {
            std::future::pending().await
        }

        fn name(&self) -> String {
            "hanging".to_string()
        }
    }

    /// Provider that returns canned text, for exercising LlmArbiter without a network
    struct CannedProvider(String);

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn generate(
            &self,
            request: GenerateRequest,
        ) -> crate::llm::LlmResult<crate::llm::GenerateResponse> {
            assert!(request.json_mode);
            Ok(crate::llm::GenerateResponse {
                text: self.0.clone(),
                metadata: crate::llm::ResponseMetadata {
                    provider: "canned".to_string(),
                    model: request.model_override.unwrap_or_default(),
                    tokens_used: None,
                    latency_ms: 1,
                },
            })
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn one_player(answer: &str) -> FrozenInputs {
        let mut answers = Answers::new();
        answers.insert(Category::Name, answer.to_string());
        let mut inputs = FrozenInputs::new();
        inputs.insert("p1".to_string(), answers);
        inputs
    }

    #[tokio::test]
    async fn test_falls_back_to_heuristic() {
        let failing = Arc::new(FailingArbiter {
            calls: AtomicUsize::new(0),
        });
        let gateway = ValidationGateway::new(vec![
            Tier::new(failing.clone(), Duration::from_secs(8)),
            Tier::new(failing.clone(), Duration::from_secs(5)),
            Tier::new(Arc::new(HeuristicArbiter), Duration::from_secs(1)),
        ]);

        let outcome = gateway.validate(&one_player("Isha"), 'I').await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.validator, "heuristic");
        assert!(outcome.degraded);
        assert!(outcome.mask["p1"][&Category::Name]);
        assert!(!outcome.mask["p1"][&Category::Place]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_tier_is_bounded_by_timeout() {
        let gateway = ValidationGateway::new(vec![
            Tier::new(Arc::new(HangingArbiter), Duration::from_secs(8)),
            Tier::new(Arc::new(HangingArbiter), Duration::from_secs(5)),
            Tier::new(Arc::new(HeuristicArbiter), Duration::from_secs(1)),
        ]);

        let started = tokio::time::Instant::now();
        let outcome = gateway.validate(&one_player("Ink"), 'I').await;
        assert_eq!(outcome.validator, "heuristic");
        assert!(started.elapsed() <= Duration::from_secs(13));
    }

    #[tokio::test]
    async fn test_exhausted_chain_rejects_everything() {
        let gateway = ValidationGateway::new(vec![Tier::new(
            Arc::new(FailingArbiter {
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(1),
        )]);

        let outcome = gateway.validate(&one_player("Isha"), 'I').await;
        assert_eq!(outcome.validator, "none");
        assert_eq!(outcome.mask["p1"], all_invalid());
    }

    #[tokio::test]
    async fn test_llm_arbiter_parses_fenced_reply() {
        let provider = Arc::new(CannedProvider(
            "```json\n{\"p1\": {\"name\": true, \"place\": false, \"animal\": false, \"thing\": false}}\n```"
                .to_string(),
        ));
        let arbiter = LlmArbiter::new(
            provider,
            ModelRef::parse("canned:test").unwrap(),
            Duration::from_secs(8),
            400,
        );
        let gateway = ValidationGateway::new(vec![Tier::new(
            Arc::new(arbiter),
            Duration::from_secs(8),
        )]);

        let outcome = gateway.validate(&one_player("Isha"), 'I').await;
        assert_eq!(outcome.validator, "canned:test");
        assert!(!outcome.degraded);
        assert!(outcome.mask["p1"][&Category::Name]);
    }

    #[tokio::test]
    async fn test_llm_arbiter_prose_reply_falls_through() {
        let provider = Arc::new(CannedProvider("I'm not sure about these.".to_string()));
        let arbiter = LlmArbiter::new(
            provider,
            ModelRef::parse("canned:test").unwrap(),
            Duration::from_secs(8),
            400,
        );
        let gateway = ValidationGateway::new(vec![
            Tier::new(Arc::new(arbiter), Duration::from_secs(8)),
            Tier::new(Arc::new(HeuristicArbiter), Duration::from_secs(1)),
        ]);

        let outcome = gateway.validate(&one_player("Isha"), 'I').await;
        assert_eq!(outcome.validator, "heuristic");
    }

    #[test]
    fn test_from_config_without_providers_is_heuristic_only() {
        let gateway = ValidationGateway::from_config(&ArbiterConfig::default(), &LlmManager::default());
        assert_eq!(gateway.tier_names(), vec!["heuristic".to_string()]);
    }

    #[test]
    fn test_from_config_uses_matching_providers() {
        let manager = LlmManager::new(vec![Arc::new(CannedProvider(String::new()))]);
        let config = ArbiterConfig {
            primary: "canned:fast".to_string(),
            secondary: "missing:model".to_string(),
            ..ArbiterConfig::default()
        };

        let gateway = ValidationGateway::from_config(&config, &manager);
        assert_eq!(
            gateway.tier_names(),
            vec!["canned:fast".to_string(), "heuristic".to_string()]
        );
    }
}
