use std::sync::Arc;

use crate::{
    app_config::ConsensusPolicy,
    email::EmailItem,
    error::AppResult,
    model::EmailCategory,
    prompt::{ClassificationRequest, ClassifierVerdict, RefinementContext, TextClassifier},
};

use super::types::{ClassificationResult, ClassificationSource};

#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub category: EmailCategory,
    pub confidence: f32,
    pub reasoning: String,
}

/// score(c) = w1 * p1 * [c1 = c] + w2 * p2 * [c2 = c]; ties go to the primary.
pub fn weighted_consensus(
    primary: &ClassifierVerdict,
    critic: &ClassifierVerdict,
    policy: &ConsensusPolicy,
) -> Consensus {
    let primary_score = policy.classifier_weight * primary.confidence;
    let critic_score = policy.critic_weight * critic.confidence;

    if primary.category == critic.category {
        return Consensus {
            category: primary.category,
            confidence: primary_score + critic_score,
            reasoning: primary.reasoning.clone(),
        };
    }

    if critic_score > primary_score {
        Consensus {
            category: critic.category,
            confidence: critic_score,
            reasoning: critic.reasoning.clone(),
        }
    } else {
        Consensus {
            category: primary.category,
            confidence: primary_score,
            reasoning: primary.reasoning.clone(),
        }
    }
}

/// Combines a primary classifier and a critic into one result per item.
/// Holds no per-item state.
pub struct ClassificationCoordinator {
    primary: Arc<dyn TextClassifier>,
    critic: Arc<dyn TextClassifier>,
    policy: ConsensusPolicy,
}

impl ClassificationCoordinator {
    pub fn new(
        primary: Arc<dyn TextClassifier>,
        critic: Arc<dyn TextClassifier>,
        policy: ConsensusPolicy,
    ) -> Self {
        Self {
            primary,
            critic,
            policy,
        }
    }

    pub fn policy(&self) -> &ConsensusPolicy {
        &self.policy
    }

    pub async fn classify(&self, item: &EmailItem) -> AppResult<ClassificationResult> {
        let threshold = self.policy.confidence_threshold;
        let mut refinement: Option<RefinementContext> = None;
        let mut last_confidence = 0.0;

        for refinement_count in 0..=self.policy.max_refinements {
            let request = ClassificationRequest::for_item(item).with_refinement(refinement.take());
            let primary = self.primary.classify(&request).await?;

            if refinement_count == 0 && primary.confidence >= threshold {
                return Ok(ClassificationResult {
                    category: primary.category,
                    confidence: primary.confidence,
                    reasoning: primary.reasoning,
                    refinement_count: 0,
                    source: ClassificationSource::ClassifierOnly,
                });
            }

            let critic = self
                .critic
                .classify(&request.with_primary(primary.clone()))
                .await?;
            let consensus = weighted_consensus(&primary, &critic, &self.policy);
            tracing::debug!(
                "Item {} pass {}: {} {:.2} vs {} {:.2} -> {} {:.2}",
                item.id,
                refinement_count,
                primary.category,
                primary.confidence,
                critic.category,
                critic.confidence,
                consensus.category,
                consensus.confidence
            );

            if consensus.confidence >= threshold {
                return Ok(ClassificationResult {
                    category: consensus.category,
                    confidence: consensus.confidence,
                    reasoning: consensus.reasoning,
                    refinement_count,
                    source: ClassificationSource::Consensus,
                });
            }

            last_confidence = consensus.confidence;
            refinement = Some(RefinementContext {
                attempt: refinement_count + 1,
                primary,
                critic,
                consensus_confidence: consensus.confidence,
            });
        }

        let category = self.policy.escalation_category;
        Ok(ClassificationResult {
            category,
            confidence: last_confidence,
            reasoning: format!(
                "Escalated to {} after {} refinement(s): consensus confidence {:.2} stayed below threshold {:.2}",
                category, self.policy.max_refinements, last_confidence, threshold
            ),
            refinement_count: self.policy.max_refinements,
            source: ClassificationSource::EscalatedDefault,
        })
    }
}
