//! Grading of final submissions.
//!
//! The orchestrator only knows the `ScoringOracle` trait; the bundled
//! `RubricOracle` grades deterministically from the knowledge base so the
//! engine works offline. The conversational grader that reads the full
//! dialogue lives in a separate service and implements the same trait.

use crate::policy::SOMMATIVE_PASS_SCORE;
use crate::types::{ClinicalCase, Disease, Evaluation, FinalSubmission, TurnRole};
use crate::Result;

/// Points awarded for the correct diagnosis
pub const DIAGNOSTIC_POINTS: f64 = 8.0;

/// Points available for the therapeutic plan
pub const THERAPEUTIC_POINTS: f64 = 8.0;

/// Points available for the clinical reasoning process
pub const PROCESS_POINTS: f64 = 4.0;

/// Grades a final submission against the reference case
pub trait ScoringOracle {
    fn evaluate(
        &self,
        case: &ClinicalCase,
        disease: &Disease,
        submission: &FinalSubmission,
    ) -> Result<Evaluation>;
}

/// Deterministic rubric grader on the 0..=20 scale
///
/// Scoring rules:
/// 1. Diagnostic (8 pts): all or nothing, matched against the disease id or
///    name, case-insensitively
/// 2. Therapeutic (8 pts): fraction of the recommended medications present
///    in the submission; extra medications are not penalized
/// 3. Process (4 pts): one point per learner justification turn, capped
#[derive(Debug, Default)]
pub struct RubricOracle;

impl RubricOracle {
    pub fn new() -> Self {
        RubricOracle
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

impl ScoringOracle for RubricOracle {
    fn evaluate(
        &self,
        case: &ClinicalCase,
        disease: &Disease,
        submission: &FinalSubmission,
    ) -> Result<Evaluation> {
        let diagnosis = normalize(&submission.diagnosis_id);
        let diagnosis_correct =
            diagnosis == normalize(&disease.id) || diagnosis == normalize(&disease.name);
        let score_diagnostic = if diagnosis_correct {
            DIAGNOSTIC_POINTS
        } else {
            0.0
        };

        let recommended = &case.recommended_medications;
        let submitted: Vec<String> = submission.medication_ids.iter().map(|m| normalize(m)).collect();
        let matched = recommended
            .iter()
            .filter(|m| submitted.contains(&normalize(m)))
            .count();
        let score_therapeutic = if recommended.is_empty() {
            THERAPEUTIC_POINTS
        } else {
            THERAPEUTIC_POINTS * matched as f64 / recommended.len() as f64
        };

        let learner_turns = submission
            .justification
            .iter()
            .filter(|t| t.role == TurnRole::Learner)
            .count();
        let score_process = (learner_turns as f64).min(PROCESS_POINTS);

        let score_total = score_diagnostic + score_therapeutic + score_process;

        let mut feedback = Vec::new();
        if diagnosis_correct {
            feedback.push(format!("Diagnostic exact : {}.", disease.name));
        } else {
            feedback.push(format!(
                "Diagnostic non retenu ; le tableau évoquait : {}.",
                disease.name
            ));
        }
        if recommended.is_empty() {
            feedback.push("Pas de traitement de référence pour ce cas.".to_string());
        } else if matched == recommended.len() {
            feedback.push("Prescription conforme aux recommandations.".to_string());
        } else {
            feedback.push(format!(
                "Prescription incomplète : {} des {} traitements recommandés.",
                matched,
                recommended.len()
            ));
        }
        if learner_turns as f64 >= PROCESS_POINTS {
            feedback.push("Raisonnement clinique bien argumenté.".to_string());
        } else if learner_turns > 0 {
            feedback.push("Justification présente mais succincte.".to_string());
        } else {
            feedback.push("Aucune justification fournie.".to_string());
        }

        let recommendation = if score_total >= SOMMATIVE_PASS_SCORE {
            "Poursuivre vers des cas plus difficiles.".to_string()
        } else {
            "Revoir ce tableau clinique avant de progresser.".to_string()
        };

        tracing::debug!(
            "Rubric for case {}: diagnostic {:.1}, therapeutic {:.1}, process {:.1}",
            case.id,
            score_diagnostic,
            score_therapeutic,
            score_process
        );

        Ok(Evaluation {
            score_diagnostic,
            score_therapeutic,
            score_process,
            score_total,
            feedback: feedback.join(" "),
            recommendation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DialogueTurn;
    use chrono::Utc;

    fn test_disease() -> Disease {
        Disease {
            id: "pyelonephrite".into(),
            name: "Pyélonéphrite aiguë".into(),
            category: "Infectiologie".into(),
        }
    }

    fn test_case() -> ClinicalCase {
        ClinicalCase {
            id: "inf_pyelo_01".into(),
            title: "Fièvre et lombalgie".into(),
            disease_id: "pyelonephrite".into(),
            difficulty: Some(8),
            presentation: "Femme de 24 ans, fièvre et lombalgie droite.".into(),
            recommended_medications: vec!["ofloxacine".into(), "paracetamol".into()],
        }
    }

    fn learner_turn(content: &str) -> DialogueTurn {
        DialogueTurn {
            role: TurnRole::Learner,
            content: content.into(),
            at: Utc::now(),
        }
    }

    fn tutor_turn(content: &str) -> DialogueTurn {
        DialogueTurn {
            role: TurnRole::Tutor,
            content: content.into(),
            at: Utc::now(),
        }
    }

    fn submission(
        diagnosis: &str,
        medications: &[&str],
        justification: Vec<DialogueTurn>,
    ) -> FinalSubmission {
        FinalSubmission {
            diagnosis_id: diagnosis.into(),
            medication_ids: medications.iter().map(|m| m.to_string()).collect(),
            justification,
        }
    }

    #[test]
    fn test_perfect_submission_scores_twenty() {
        let oracle = RubricOracle::new();
        let submission = submission(
            "pyelonephrite",
            &["ofloxacine", "paracetamol"],
            vec![
                learner_turn("Fièvre avec signes fonctionnels urinaires."),
                learner_turn("Douleur lombaire unilatérale."),
                learner_turn("Bandelette urinaire positive attendue."),
                learner_turn("Fluoroquinolone en première intention."),
            ],
        );

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert_eq!(eval.score_diagnostic, 8.0);
        assert_eq!(eval.score_therapeutic, 8.0);
        assert_eq!(eval.score_process, 4.0);
        assert_eq!(eval.score_total, 20.0);
        assert!(eval.recommendation.contains("Poursuivre"));
    }

    #[test]
    fn test_wrong_diagnosis_scores_zero_diagnostic() {
        let oracle = RubricOracle::new();
        let submission = submission("cystite", &["ofloxacine"], vec![]);

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert_eq!(eval.score_diagnostic, 0.0);
        assert!(eval.feedback.contains("Diagnostic non retenu"));
    }

    #[test]
    fn test_diagnosis_matches_disease_name_case_insensitive() {
        let oracle = RubricOracle::new();
        let submission = submission("  pyélonéphrite AIGUË ", &[], vec![]);

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert_eq!(eval.score_diagnostic, 8.0);
    }

    #[test]
    fn test_partial_therapeutic_overlap() {
        let oracle = RubricOracle::new();
        let submission = submission("pyelonephrite", &["ofloxacine"], vec![]);

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert_eq!(eval.score_therapeutic, 4.0);
        assert!(eval.feedback.contains("1 des 2"));
    }

    #[test]
    fn test_extra_medications_not_penalized() {
        let oracle = RubricOracle::new();
        let submission = submission(
            "pyelonephrite",
            &["ofloxacine", "paracetamol", "amoxicilline"],
            vec![],
        );

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert_eq!(eval.score_therapeutic, 8.0);
    }

    #[test]
    fn test_no_recommended_medications_full_credit() {
        let oracle = RubricOracle::new();
        let mut case = test_case();
        case.recommended_medications.clear();
        let submission = submission("pyelonephrite", &[], vec![]);

        let eval = oracle.evaluate(&case, &test_disease(), &submission).unwrap();
        assert_eq!(eval.score_therapeutic, 8.0);
    }

    #[test]
    fn test_process_caps_at_four_learner_turns() {
        let oracle = RubricOracle::new();
        let turns: Vec<DialogueTurn> = (0..6).map(|i| learner_turn(&format!("point {}", i))).collect();
        let submission = submission("pyelonephrite", &[], turns);

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert_eq!(eval.score_process, 4.0);
    }

    #[test]
    fn test_tutor_turns_not_counted_in_process() {
        let oracle = RubricOracle::new();
        let submission = submission(
            "pyelonephrite",
            &[],
            vec![
                tutor_turn("Quels examens demandez-vous ?"),
                learner_turn("ECBU et hémocultures."),
                tutor_turn("Et ensuite ?"),
            ],
        );

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert_eq!(eval.score_process, 1.0);
    }

    #[test]
    fn test_failing_total_gets_review_recommendation() {
        let oracle = RubricOracle::new();
        let submission = submission("cystite", &[], vec![]);

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert!(eval.score_total < SOMMATIVE_PASS_SCORE);
        assert!(eval.recommendation.contains("Revoir"));
    }

    #[test]
    fn test_components_sum_to_total() {
        let oracle = RubricOracle::new();
        let submission = submission(
            "pyelonephrite",
            &["paracetamol"],
            vec![learner_turn("Raisonnement.")],
        );

        let eval = oracle
            .evaluate(&test_case(), &test_disease(), &submission)
            .unwrap();
        assert_eq!(
            eval.score_total,
            eval.score_diagnostic + eval.score_therapeutic + eval.score_process
        );
    }
}
