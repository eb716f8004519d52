use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use tutor_core::*;

#[derive(Parser)]
#[command(name = "externat")]
#[command(about = "Adaptive clinical case tutoring system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Knowledge base JSON file (defaults to the built-in knowledge)
    #[arg(long, global = true)]
    kb: Option<PathBuf>,

    /// Seed for reproducible case selection
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the next session for a learner in a category
    Start {
        /// Learner identifier
        #[arg(long)]
        learner: String,

        /// Clinical category (e.g. Infectiologie)
        #[arg(long)]
        category: String,
    },

    /// Submit the final answer for an in-progress session
    Submit {
        /// Session id printed by `start`
        #[arg(long)]
        session: uuid::Uuid,

        /// Diagnosis, as a disease id or name
        #[arg(long)]
        diagnosis: String,

        /// Medication ids, comma separated
        #[arg(long, value_delimiter = ',')]
        medications: Vec<String>,

        /// One-line justification of the reasoning
        #[arg(long)]
        justification: Option<String>,
    },

    /// Show a learner's completed sessions in a category
    History {
        /// Learner identifier
        #[arg(long)]
        learner: String,

        /// Clinical category
        #[arg(long)]
        category: String,
    },

    /// Roll up finished sessions into the CSV archive
    Rollup {
        /// Clean up processed journal files after rollup
        #[arg(long)]
        cleanup: bool,
    },

    /// Inspect the knowledge base
    Kb {
        /// Export the knowledge base to a JSON file
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tutor_core::logging::init();

    let cli = Cli::parse();

    // Determine data directory and knowledge base
    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let kb_path = cli.kb.or_else(|| config.knowledge.path.clone());
    let seed = cli.seed.or(config.random.seed);

    let kb = match &kb_path {
        Some(path) => KnowledgeBase::load(path)?,
        None => builtin_knowledge_base().clone(),
    };
    let errors = kb.validate();
    if !errors.is_empty() {
        eprintln!("Knowledge base validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::KnowledgeValidation("Invalid knowledge base".into()));
    }

    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    match cli.command {
        Commands::Start { learner, category } => {
            cmd_start(&kb, data_dir, &mut rng, &learner, &category)
        }
        Commands::Submit {
            session,
            diagnosis,
            medications,
            justification,
        } => cmd_submit(&kb, data_dir, session, diagnosis, medications, justification),
        Commands::History { learner, category } => cmd_history(&kb, data_dir, &learner, &category),
        Commands::Rollup { cleanup } => cmd_rollup(data_dir, cleanup),
        Commands::Kb { export } => cmd_kb(&kb, export),
    }
}

fn cmd_start(
    kb: &KnowledgeBase,
    data_dir: PathBuf,
    rng: &mut ChaCha8Rng,
    learner: &str,
    category: &str,
) -> Result<()> {
    std::fs::create_dir_all(&data_dir)?;
    let store = JsonlSessionStore::new(&data_dir);

    let started = start_session(kb, &store, rng, learner, category, chrono::Utc::now())?;
    display_started_session(&started);

    Ok(())
}

fn cmd_submit(
    kb: &KnowledgeBase,
    data_dir: PathBuf,
    session: uuid::Uuid,
    diagnosis: String,
    medications: Vec<String>,
    justification: Option<String>,
) -> Result<()> {
    let store = JsonlSessionStore::new(&data_dir);
    let oracle = RubricOracle::new();
    let now = chrono::Utc::now();

    let submission = FinalSubmission {
        diagnosis_id: diagnosis,
        medication_ids: medications,
        justification: justification
            .map(|content| {
                vec![DialogueTurn {
                    role: TurnRole::Learner,
                    content,
                    at: now,
                }]
            })
            .unwrap_or_default(),
    };

    let evaluation = submit_final_answer(kb, &store, &oracle, session, &submission, now)?;
    display_evaluation(&evaluation);

    Ok(())
}

fn cmd_history(kb: &KnowledgeBase, data_dir: PathBuf, learner: &str, category: &str) -> Result<()> {
    let store = JsonlSessionStore::new(&data_dir);
    let sessions = session_history(&store, kb, learner, category)?;

    if sessions.is_empty() {
        println!("No completed sessions for {} in {}.", learner, category);
        return Ok(());
    }

    println!("\nCompleted sessions for {} in {}:", learner, category);
    println!();
    for session in &sessions {
        let session_type = session.context.session_type.to_string();
        let score = session
            .score
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}  {:<10} {:<22} {:>5} / 20",
            session.started_at.format("%Y-%m-%d %H:%M"),
            session_type,
            session.case_id,
            score
        );
    }

    let placement = next_placement(&sessions);
    println!();
    println!("  Current level: {}", placement.level);
    println!("  Next session: {}", placement.next_session_type);

    Ok(())
}

fn cmd_rollup(data_dir: PathBuf, cleanup: bool) -> Result<()> {
    let store = JsonlSessionStore::new(&data_dir);

    if !store.journal_path().exists() {
        println!("No journal file found - nothing to roll up.");
        return Ok(());
    }

    let count = tutor_core::archive::rollup_finished_sessions(&store)?;

    println!("✓ Rolled up {} sessions to CSV", count);
    println!("  CSV: {}", store.archive_path().display());

    if cleanup {
        let cleaned = tutor_core::archive::cleanup_processed_journals(&data_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed journal files", cleaned);
        }
    }

    Ok(())
}

fn cmd_kb(kb: &KnowledgeBase, export: Option<PathBuf>) -> Result<()> {
    println!(
        "Knowledge base: {} diseases, {} medications, {} cases",
        kb.diseases.len(),
        kb.medications.len(),
        kb.cases.len()
    );

    let mut categories: Vec<&str> = kb.diseases.values().map(|d| d.category.as_str()).collect();
    categories.sort();
    categories.dedup();
    for category in categories {
        println!(
            "  {:<16} {} cases",
            category,
            kb.cases_in_category(category).len()
        );
    }

    if let Some(path) = export {
        kb.save(&path)?;
        println!("✓ Exported knowledge base to {}", path.display());
    }

    Ok(())
}

fn display_started_session(started: &StartedSession) {
    let session_type = started.session_type().to_string().to_uppercase();

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {} SESSION", session_type);
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  {}", started.case.title);
    println!(
        "  Case: {}  (difficulty {})",
        started.case.id,
        started.case.effective_difficulty()
    );
    println!("  Session: {}", started.session.id);
    println!();
    println!("  {}", started.case.presentation);
    println!();
    println!(
        "  → When ready: externat submit --session {} --diagnosis <id> --medications <ids>",
        started.session.id
    );
    println!();
}

fn display_evaluation(evaluation: &Evaluation) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  EVALUATION");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  Diagnostic:  {:>4.1} / 8", evaluation.score_diagnostic);
    println!("  Therapeutic: {:>4.1} / 8", evaluation.score_therapeutic);
    println!("  Process:     {:>4.1} / 4", evaluation.score_process);
    println!("  Total:       {:>4.1} / 20", evaluation.score_total);
    println!();
    println!("  {}", evaluation.feedback);
    println!("  {}", evaluation.recommendation);
    println!();
    println!("✓ Session completed");
}
