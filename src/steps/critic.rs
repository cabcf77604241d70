// Critic: scores how well a research result supports its sub-question
use async_trait::async_trait;

use crate::agent::state::StepKind;
use crate::errors::Result;
use crate::steps::{AgentStep, CritiqueRequest};

/// Critic that trusts retrieval scores
///
/// The score is the result's confidence when at least
/// `min_supporting_chunks` chunks came back, otherwise 0.0. Output is
/// always a finite number in [0, 1].
#[derive(Debug, Clone)]
pub struct ScoreCritic {
    min_supporting_chunks: usize,
}

impl ScoreCritic {
    pub fn new(min_supporting_chunks: usize) -> Self {
        Self {
            min_supporting_chunks,
        }
    }

    pub fn score(&self, request: &CritiqueRequest) -> f64 {
        if request.result.chunks().len() < self.min_supporting_chunks.max(1) {
            return 0.0;
        }
        let score = request.result.confidence();
        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        }
    }
}

impl Default for ScoreCritic {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl AgentStep for ScoreCritic {
    type Input = CritiqueRequest;
    type Output = f64;

    fn kind(&self) -> StepKind {
        StepKind::Critic
    }

    async fn run(&self, request: CritiqueRequest) -> Result<f64> {
        Ok(self.score(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ResearchResult, Span, SubQuestion};
    use quickcheck_macros::quickcheck;
    use uuid::Uuid;

    fn request(scores: &[f32]) -> CritiqueRequest {
        let sq = SubQuestion::new("q", Uuid::new_v4(), 0);
        let chunks = scores
            .iter()
            .enumerate()
            .map(|(i, s)| Chunk::new("d", i, Span::new(0, 1), "t", vec![]).scored(*s))
            .collect();
        CritiqueRequest {
            sub_question: sq.clone(),
            result: ResearchResult::new(sq, chunks),
        }
    }

    #[tokio::test]
    async fn test_score_is_result_confidence() {
        let critic = ScoreCritic::default();
        let score = critic.run(request(&[0.3, 0.9])).await.unwrap();
        assert!((score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_too_few_chunks_scores_zero() {
        let critic = ScoreCritic::new(3);
        assert_eq!(critic.score(&request(&[0.9, 0.9])), 0.0);
        assert_eq!(ScoreCritic::default().score(&request(&[])), 0.0);
    }

    #[test]
    fn test_kind() {
        assert_eq!(ScoreCritic::default().kind(), StepKind::Critic);
    }

    #[quickcheck]
    fn prop_score_is_bounded(scores: Vec<f32>) -> bool {
        let score = ScoreCritic::default().score(&request(&scores));
        score.is_finite() && (0.0..=1.0).contains(&score)
    }
}
