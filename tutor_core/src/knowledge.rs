//! Knowledge base of diseases, medications and clinical cases.
//!
//! This module provides the built-in sample knowledge base, JSON file
//! loading, referential validation, and the unseen-candidate search used
//! when a new session needs a case near a target difficulty.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tempfile::NamedTempFile;

/// Candidates this close to the target are equivalent; one is picked at
/// random so repeated difficulty values do not always return the same case.
const NEAR_WINDOW: i32 = 2;

/// Beyond the near window, candidates within this distance are preferred
/// over the rest of the category.
const WIDE_WINDOW: i32 = 5;

/// Cached built-in knowledge base - built once and reused across operations
static BUILTIN_KB: Lazy<KnowledgeBase> = Lazy::new(build_builtin_knowledge_base_internal);

/// Get a reference to the cached built-in knowledge base
pub fn builtin_knowledge_base() -> &'static KnowledgeBase {
    &BUILTIN_KB
}

/// Builds a fresh copy of the built-in knowledge base
///
/// **Note**: For production use, prefer `builtin_knowledge_base()` which
/// returns a cached reference. This function is retained for testing and
/// as a starting point for custom knowledge files.
pub fn build_builtin_knowledge_base() -> KnowledgeBase {
    build_builtin_knowledge_base_internal()
}

impl KnowledgeBase {
    /// Load a knowledge base from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let kb: KnowledgeBase = serde_json::from_str(&contents)?;
        tracing::info!(
            "Loaded knowledge base from {:?} ({} diseases, {} cases)",
            path,
            kb.diseases.len(),
            kb.cases.len()
        );
        Ok(kb)
    }

    /// Save the knowledge base to a JSON file
    ///
    /// Writes to a temp file in the target directory and renames over the
    /// destination so a crash cannot leave a half-written file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = NamedTempFile::new_in(
            path.parent()
                .ok_or_else(|| Error::Other("Knowledge path has no parent directory".to_string()))?,
        )?;

        serde_json::to_writer_pretty(temp.as_file(), self)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Saved knowledge base to {:?}", path);
        Ok(())
    }

    pub fn case(&self, id: &str) -> Option<&ClinicalCase> {
        self.cases.get(id)
    }

    pub fn disease(&self, id: &str) -> Option<&Disease> {
        self.diseases.get(id)
    }

    pub fn medication(&self, id: &str) -> Option<&Medication> {
        self.medications.get(id)
    }

    /// Category a case belongs to, resolved through its primary disease.
    ///
    /// Returns None when the disease reference is dangling.
    pub fn case_category(&self, case: &ClinicalCase) -> Option<&str> {
        self.diseases
            .get(&case.disease_id)
            .map(|d| d.category.as_str())
    }

    /// All cases whose primary disease belongs to the category, sorted by
    /// case id so downstream "first found" tie-breaks are deterministic.
    pub fn cases_in_category(&self, category: &str) -> Vec<&ClinicalCase> {
        let mut cases: Vec<&ClinicalCase> = self
            .cases
            .values()
            .filter(|c| self.case_category(c) == Some(category))
            .collect();
        cases.sort_by_key(|c| &c.id);
        cases
    }

    /// Search for an unseen case in the category at or near the target
    /// difficulty.
    ///
    /// Tiers, in priority order:
    /// 1. Within ±2 of target: one chosen uniformly at random.
    /// 2. Within ±5: the candidate numerically closest to target (first
    ///    such candidate on equal distance).
    /// 3. Any remaining unseen candidate: same closest-distance selection.
    /// 4. None - the caller decides whether to recycle seen cases.
    ///
    /// A null difficulty counts as 1 for the distance comparison only.
    pub fn find_candidate(
        &self,
        category: &str,
        target_level: i32,
        exclude: &HashSet<String>,
        rng: &mut impl Rng,
    ) -> Option<&ClinicalCase> {
        let candidates: Vec<&ClinicalCase> = self
            .cases_in_category(category)
            .into_iter()
            .filter(|c| !exclude.contains(&c.id))
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let distance = |c: &ClinicalCase| (c.effective_difficulty() - target_level).abs();

        let near: Vec<&ClinicalCase> = candidates
            .iter()
            .filter(|c| distance(c) <= NEAR_WINDOW)
            .copied()
            .collect();
        if !near.is_empty() {
            tracing::debug!(
                "Candidate search: {} cases within ±{} of level {}",
                near.len(),
                NEAR_WINDOW,
                target_level
            );
            return near.choose(rng).copied();
        }

        let wide = candidates
            .iter()
            .filter(|c| distance(c) <= WIDE_WINDOW)
            .min_by_key(|c| distance(c))
            .copied();
        if let Some(case) = wide {
            tracing::debug!(
                "Candidate search: closest within ±{} of level {} is {}",
                WIDE_WINDOW,
                target_level,
                case.id
            );
            return Some(case);
        }

        let any = candidates.iter().min_by_key(|c| distance(c)).copied();
        if let Some(case) = any {
            tracing::debug!(
                "Candidate search: no case within ±{} of level {}, taking closest {}",
                WIDE_WINDOW,
                target_level,
                case.id
            );
        }
        any
    }

    /// Validate the knowledge base for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (id, disease) in &self.diseases {
            if id.is_empty() || disease.id.is_empty() {
                errors.push("Disease has empty ID".to_string());
            }
            if id != &disease.id {
                errors.push(format!(
                    "Disease key '{}' doesn't match disease.id '{}'",
                    id, disease.id
                ));
            }
            if disease.name.is_empty() {
                errors.push(format!("Disease '{}' has empty name", id));
            }
            if disease.category.is_empty() {
                errors.push(format!("Disease '{}' has empty category", id));
            }
        }

        for (id, medication) in &self.medications {
            if id.is_empty() || medication.id.is_empty() {
                errors.push("Medication has empty ID".to_string());
            }
            if id != &medication.id {
                errors.push(format!(
                    "Medication key '{}' doesn't match medication.id '{}'",
                    id, medication.id
                ));
            }
            if medication.name.is_empty() {
                errors.push(format!("Medication '{}' has empty name", id));
            }
        }

        for (id, case) in &self.cases {
            if id.is_empty() || case.id.is_empty() {
                errors.push("Clinical case has empty ID".to_string());
            }
            if id != &case.id {
                errors.push(format!(
                    "Case key '{}' doesn't match case.id '{}'",
                    id, case.id
                ));
            }
            if case.title.is_empty() {
                errors.push(format!("Case '{}' has empty title", id));
            }

            if !self.diseases.contains_key(&case.disease_id) {
                errors.push(format!(
                    "Case '{}' references non-existent disease '{}'",
                    id, case.disease_id
                ));
            }

            if let Some(difficulty) = case.difficulty {
                if !(DIFFICULTY_MIN..=DIFFICULTY_MAX).contains(&difficulty) {
                    errors.push(format!(
                        "Case '{}': difficulty {} outside {}..={}",
                        id, difficulty, DIFFICULTY_MIN, DIFFICULTY_MAX
                    ));
                }
            }

            for med_id in &case.recommended_medications {
                if !self.medications.contains_key(med_id) {
                    errors.push(format!(
                        "Case '{}' references non-existent medication '{}'",
                        id, med_id
                    ));
                }
            }
        }

        errors
    }
}

/// Internal function that actually builds the built-in knowledge base
fn build_builtin_knowledge_base_internal() -> KnowledgeBase {
    let mut diseases = HashMap::new();
    let mut medications = HashMap::new();
    let mut cases = HashMap::new();

    // ========================================================================
    // Diseases
    // ========================================================================

    diseases.insert(
        "pyelonephrite".into(),
        Disease {
            id: "pyelonephrite".into(),
            name: "Pyélonéphrite aiguë".into(),
            category: "Infectiologie".into(),
        },
    );

    diseases.insert(
        "pneumonie_communautaire".into(),
        Disease {
            id: "pneumonie_communautaire".into(),
            name: "Pneumonie aiguë communautaire".into(),
            category: "Infectiologie".into(),
        },
    );

    diseases.insert(
        "meningite_bacterienne".into(),
        Disease {
            id: "meningite_bacterienne".into(),
            name: "Méningite bactérienne".into(),
            category: "Infectiologie".into(),
        },
    );

    diseases.insert(
        "erysipele".into(),
        Disease {
            id: "erysipele".into(),
            name: "Érysipèle".into(),
            category: "Infectiologie".into(),
        },
    );

    diseases.insert(
        "endocardite".into(),
        Disease {
            id: "endocardite".into(),
            name: "Endocardite infectieuse".into(),
            category: "Infectiologie".into(),
        },
    );

    diseases.insert(
        "infarctus_myocarde".into(),
        Disease {
            id: "infarctus_myocarde".into(),
            name: "Infarctus du myocarde".into(),
            category: "Cardiologie".into(),
        },
    );

    diseases.insert(
        "insuffisance_cardiaque".into(),
        Disease {
            id: "insuffisance_cardiaque".into(),
            name: "Insuffisance cardiaque aiguë".into(),
            category: "Cardiologie".into(),
        },
    );

    diseases.insert(
        "pericardite".into(),
        Disease {
            id: "pericardite".into(),
            name: "Péricardite aiguë".into(),
            category: "Cardiologie".into(),
        },
    );

    diseases.insert(
        "asthme".into(),
        Disease {
            id: "asthme".into(),
            name: "Exacerbation d'asthme".into(),
            category: "Pneumologie".into(),
        },
    );

    diseases.insert(
        "embolie_pulmonaire".into(),
        Disease {
            id: "embolie_pulmonaire".into(),
            name: "Embolie pulmonaire".into(),
            category: "Pneumologie".into(),
        },
    );

    diseases.insert(
        "psoriasis".into(),
        Disease {
            id: "psoriasis".into(),
            name: "Psoriasis en plaques".into(),
            category: "Dermatologie".into(),
        },
    );

    // ========================================================================
    // Medications
    // ========================================================================

    for (id, name) in [
        ("amoxicilline", "Amoxicilline"),
        ("amoxicilline_ac_clav", "Amoxicilline + acide clavulanique"),
        ("ceftriaxone", "Ceftriaxone"),
        ("ofloxacine", "Ofloxacine"),
        ("gentamicine", "Gentamicine"),
        ("aspirine", "Aspirine"),
        ("heparine", "Héparine non fractionnée"),
        ("furosemide", "Furosémide"),
        ("salbutamol", "Salbutamol"),
        ("prednisone", "Prednisone"),
        ("paracetamol", "Paracétamol"),
        ("dermocorticoides", "Dermocorticoïdes"),
    ] {
        medications.insert(
            id.to_string(),
            Medication {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
    }

    // ========================================================================
    // Clinical cases: Infectiologie
    // ========================================================================

    cases.insert(
        "inf_pyelo_01".into(),
        ClinicalCase {
            id: "inf_pyelo_01".into(),
            title: "Fièvre et lombalgie chez une femme jeune".into(),
            disease_id: "pyelonephrite".into(),
            difficulty: Some(8),
            presentation: "Femme de 24 ans, fièvre à 39,2 °C depuis 48 h, \
                           brûlures mictionnelles et douleur lombaire droite."
                .into(),
            recommended_medications: vec!["ofloxacine".into(), "paracetamol".into()],
        },
    );

    cases.insert(
        "inf_pyelo_02".into(),
        ClinicalCase {
            id: "inf_pyelo_02".into(),
            title: "Sepsis d'origine urinaire chez une patiente diabétique".into(),
            disease_id: "pyelonephrite".into(),
            difficulty: Some(12),
            presentation: "Femme de 67 ans diabétique, confusion fébrile, \
                           hypotension à 85/50 mmHg, bandelette urinaire positive."
                .into(),
            recommended_medications: vec!["ceftriaxone".into(), "gentamicine".into()],
        },
    );

    cases.insert(
        "inf_pneumonie_01".into(),
        ClinicalCase {
            id: "inf_pneumonie_01".into(),
            title: "Toux fébrile et foyer de crépitants".into(),
            disease_id: "pneumonie_communautaire".into(),
            difficulty: Some(9),
            presentation: "Homme de 52 ans, toux productive, fièvre à 38,9 °C, \
                           foyer de crépitants en base droite, saturation 94 %."
                .into(),
            recommended_medications: vec!["amoxicilline".into()],
        },
    );

    cases.insert(
        "inf_pneumonie_02".into(),
        ClinicalCase {
            id: "inf_pneumonie_02".into(),
            title: "Pneumonie hypoxémiante du sujet âgé".into(),
            disease_id: "pneumonie_communautaire".into(),
            difficulty: Some(14),
            presentation: "Homme de 81 ans institutionnalisé, polypnée, \
                           saturation 88 % en air ambiant, opacité lobaire inférieure gauche."
                .into(),
            recommended_medications: vec!["ceftriaxone".into()],
        },
    );

    cases.insert(
        "inf_meningite_01".into(),
        ClinicalCase {
            id: "inf_meningite_01".into(),
            title: "Syndrome méningé fébrile avec purpura".into(),
            disease_id: "meningite_bacterienne".into(),
            difficulty: Some(16),
            presentation: "Étudiante de 19 ans, céphalées brutales, raideur de \
                           nuque, photophobie, purpura nécrotique des membres inférieurs."
                .into(),
            recommended_medications: vec!["ceftriaxone".into()],
        },
    );

    cases.insert(
        "inf_erysipele_01".into(),
        ClinicalCase {
            id: "inf_erysipele_01".into(),
            title: "Grosse jambe rouge aiguë fébrile".into(),
            disease_id: "erysipele".into(),
            difficulty: Some(5),
            presentation: "Femme de 58 ans, placard inflammatoire du mollet \
                           gauche à bords nets, fièvre à 38,6 °C, intertrigo inter-orteils."
                .into(),
            recommended_medications: vec!["amoxicilline".into(), "paracetamol".into()],
        },
    );

    cases.insert(
        "inf_erysipele_02".into(),
        ClinicalCase {
            id: "inf_erysipele_02".into(),
            title: "Placard inflammatoire du visage".into(),
            disease_id: "erysipele".into(),
            // Imported without a difficulty; counts as 1 in distance comparisons.
            difficulty: None,
            presentation: "Homme de 45 ans, placard érythémateux unilatéral de \
                           la joue, bourrelet périphérique, fièvre."
                .into(),
            recommended_medications: vec!["amoxicilline".into()],
        },
    );

    cases.insert(
        "inf_endocardite_01".into(),
        ClinicalCase {
            id: "inf_endocardite_01".into(),
            title: "Fièvre prolongée sur valve prothétique".into(),
            disease_id: "endocardite".into(),
            difficulty: Some(20),
            presentation: "Homme de 70 ans porteur d'une bioprothèse aortique, \
                           fièvre depuis trois semaines, souffle diastolique nouveau, \
                           faux panaris d'Osler."
                .into(),
            recommended_medications: vec!["amoxicilline".into(), "gentamicine".into()],
        },
    );

    // ========================================================================
    // Clinical cases: Cardiologie
    // ========================================================================

    cases.insert(
        "card_idm_01".into(),
        ClinicalCase {
            id: "card_idm_01".into(),
            title: "Douleur thoracique constrictive".into(),
            disease_id: "infarctus_myocarde".into(),
            difficulty: Some(10),
            presentation: "Homme de 61 ans tabagique, douleur rétrosternale \
                           constrictive depuis 40 minutes, sus-décalage ST en antérieur."
                .into(),
            recommended_medications: vec!["aspirine".into(), "heparine".into()],
        },
    );

    cases.insert(
        "card_ic_01".into(),
        ClinicalCase {
            id: "card_ic_01".into(),
            title: "Dyspnée aiguë avec crépitants bilatéraux".into(),
            disease_id: "insuffisance_cardiaque".into(),
            difficulty: Some(12),
            presentation: "Femme de 78 ans hypertendue, orthopnée, crépitants \
                           bilatéraux remontant à mi-champs, turgescence jugulaire."
                .into(),
            recommended_medications: vec!["furosemide".into()],
        },
    );

    cases.insert(
        "card_pericardite_01".into(),
        ClinicalCase {
            id: "card_pericardite_01".into(),
            title: "Douleur thoracique majorée à l'inspiration".into(),
            disease_id: "pericardite".into(),
            difficulty: Some(7),
            presentation: "Homme de 28 ans, douleur thoracique augmentée en \
                           décubitus, soulagée penché en avant, frottement péricardique."
                .into(),
            recommended_medications: vec!["aspirine".into()],
        },
    );

    // ========================================================================
    // Clinical cases: Pneumologie
    // ========================================================================

    cases.insert(
        "pneu_asthme_01".into(),
        ClinicalCase {
            id: "pneu_asthme_01".into(),
            title: "Dyspnée sifflante nocturne".into(),
            disease_id: "asthme".into(),
            difficulty: Some(6),
            presentation: "Femme de 23 ans asthmatique connue, dyspnée sifflante \
                           depuis la nuit, débit expiratoire de pointe à 55 % de la théorique."
                .into(),
            recommended_medications: vec!["salbutamol".into(), "prednisone".into()],
        },
    );

    cases.insert(
        "pneu_embolie_01".into(),
        ClinicalCase {
            id: "pneu_embolie_01".into(),
            title: "Dyspnée brutale au retour d'un vol long-courrier".into(),
            disease_id: "embolie_pulmonaire".into(),
            difficulty: Some(13),
            presentation: "Homme de 49 ans, dyspnée et douleur basithoracique \
                           brutales 48 h après un vol de 11 heures, tachycardie à 118/min."
                .into(),
            recommended_medications: vec!["heparine".into()],
        },
    );

    // ========================================================================
    // Clinical cases: Dermatologie
    // ========================================================================

    cases.insert(
        "derm_psoriasis_01".into(),
        ClinicalCase {
            id: "derm_psoriasis_01".into(),
            title: "Plaques érythémato-squameuses des coudes".into(),
            disease_id: "psoriasis".into(),
            difficulty: Some(4),
            presentation: "Homme de 35 ans, plaques bien limitées des coudes et \
                           genoux, squames blanchâtres, signe de la tache de bougie."
                .into(),
            recommended_medications: vec!["dermocorticoides".into()],
        },
    );

    KnowledgeBase {
        diseases,
        medications,
        cases,
    }
}
