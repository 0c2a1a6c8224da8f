//! eval-cli
//!
//! Command-line front end for the performance evaluation engine.
//!
//! ## Commands
//!
//! - `batch` - evaluate a recorded performance against a score in one shot
//! - `live`  - drive the real-time evaluator from an interactive REPL

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eval_core::{EvaluationOptions, EvaluationResult, PedalKind, Performance, RealTimeDriver, Score};
use rustyline::DefaultEditor;

#[derive(Parser)]
#[command(name = "eval-cli")]
#[command(author, version, about = "Evaluate a MIDI performance against a ground-truth score")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a recorded performance against a score in one shot
    Batch {
        /// Score JSON file (a serialized `eval_core::Score`)
        #[arg(short, long)]
        score: PathBuf,

        /// Performance JSON file (a serialized `eval_core::Performance`)
        #[arg(short, long)]
        performance: PathBuf,

        /// Evaluation options TOML file (defaults used if omitted)
        #[arg(short, long)]
        options: Option<PathBuf>,

        /// Print the full EvaluationResult as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Drive the real-time evaluator from an interactive REPL: type
    /// `on <pitch> <velocity>`/`off <pitch>` lines to feed notes.
    Live {
        /// Score JSON file
        #[arg(short, long)]
        score: PathBuf,

        /// Evaluation options TOML file (defaults used if omitted)
        #[arg(short, long)]
        options: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Batch { score, performance, options, json } => cmd_batch(&score, &performance, options.as_deref(), json),
        Commands::Live { score, options } => cmd_live(&score, options.as_deref()),
    }
}

fn load_score(path: &std::path::Path) -> Result<Score> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading score file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing score file {}", path.display()))
}

fn load_performance(path: &std::path::Path) -> Result<Performance> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading performance file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing performance file {}", path.display()))
}

fn load_options(path: Option<&std::path::Path>) -> Result<EvaluationOptions> {
    let Some(path) = path else { return Ok(EvaluationOptions::default()) };
    let content = std::fs::read_to_string(path).with_context(|| format!("reading options file {}", path.display()))?;
    let options = EvaluationOptions::from_toml_str(&content).map_err(|e| anyhow::anyhow!("{e}"))?;
    options.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(options)
}

fn cmd_batch(score_path: &std::path::Path, performance_path: &std::path::Path, options_path: Option<&std::path::Path>, json: bool) -> Result<()> {
    let score = load_score(score_path)?;
    let performance = load_performance(performance_path)?;
    let options = load_options(options_path)?;

    let result = eval_core::evaluate(&score, &performance, &options);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &EvaluationResult) {
    let overall = result.overall_score();
    let grade = EvaluationResult::grade_letter(overall);

    println!();
    println!("{}", "=== Performance Evaluation ===".bold());
    println!("alignment: {}", result.alignment_algorithm);
    println!("overall:   {:.1} ({})", overall, grade.bold());
    println!();
    println!(
        "note accuracy: {:.1}  (correct {}, wrong {}, octave {}, missed {}, extra {})",
        result.note_accuracy.score,
        result.note_accuracy.correct,
        result.note_accuracy.wrong,
        result.note_accuracy.octave_errors,
        result.note_accuracy.missed,
        result.note_accuracy.extra,
    );
    println!(
        "rhythm:        {:.1}  (mean deviation {:.0}ms, std dev {:.0}ms)",
        result.rhythm.score, result.rhythm.mean_deviation_ms, result.rhythm.std_dev_ms
    );
    println!(
        "tempo:         {:.1}  (detected {:.1} bpm, deviation {:.1}%, drift {:?})",
        result.tempo.score,
        result.tempo.detected_bpm,
        result.tempo.deviation * 100.0,
        result.tempo.drift_trend
    );
    println!();

    let mut issues: Vec<_> = result
        .note_accuracy
        .issues
        .iter()
        .chain(result.rhythm.issues.iter())
        .chain(result.tempo.issues.iter())
        .collect();
    issues.sort_by_key(|i| std::cmp::Reverse(i.severity));
    if issues.is_empty() {
        println!("{}", "no issues".green());
    } else {
        println!("{}", "issues:".bold());
        for issue in issues {
            let tag = format!("{:?}", issue.severity).to_lowercase();
            let line = format!("  [{tag}] {}: {}", issue.issue_type, issue.description);
            match issue.severity {
                eval_core::IssueSeverity::Critical | eval_core::IssueSeverity::Significant => println!("{}", line.red()),
                eval_core::IssueSeverity::Moderate => println!("{}", line.yellow()),
                _ => println!("{line}"),
            }
        }
    }
}

fn cmd_live(score_path: &std::path::Path, options_path: Option<&std::path::Path>) -> Result<()> {
    let score = load_score(score_path)?;
    let options = load_options(options_path)?;

    println!("{}", "eval-cli live mode".bold());
    println!("commands: on <pitch> <velocity>, off <pitch>, pedal <sustain|soft|sostenuto> <0-127>, status, quit");

    let mut driver = RealTimeDriver::new(score, options, print_feedback, print_error);
    driver.start(0.0);

    let mut rl = DefaultEditor::new()?;
    let mut clock_ms = 0.0_f64;
    while let Ok(line) = rl.readline("eval> ") {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["on", pitch, velocity] => {
                if let (Ok(pitch), Ok(velocity)) = (pitch.parse(), velocity.parse()) {
                    clock_ms += 20.0;
                    driver.on_note_on(pitch, velocity, clock_ms);
                }
            }
            ["off", pitch] => {
                if let Ok(pitch) = pitch.parse() {
                    clock_ms += 20.0;
                    driver.on_note_off(pitch, clock_ms, None);
                }
            }
            ["pedal", kind, value] => {
                let kind = match *kind {
                    "sustain" => Some(PedalKind::Sustain),
                    "soft" => Some(PedalKind::Soft),
                    "sostenuto" => Some(PedalKind::Sostenuto),
                    _ => None,
                };
                if let (Some(kind), Ok(value)) = (kind, value.parse()) {
                    clock_ms += 20.0;
                    driver.on_pedal(kind, value, clock_ms);
                }
            }
            ["status"] => {
                let progress = driver.get_progress();
                println!(
                    "measure {} | score position {} | {:.0}% complete",
                    progress.current_measure, progress.score_position, progress.progress_percent
                );
            }
            ["quit"] | ["exit"] => break,
            [] => {}
            _ => println!("unrecognized command"),
        }
    }

    driver.stop();
    print_summary(&driver.get_final_evaluation());
    Ok(())
}

fn print_feedback(feedback: eval_core::RealTimeFeedback) {
    println!("{} cursor at {}", "[feedback]".cyan(), feedback.cursor);
    if !feedback.timing_message.is_empty() {
        println!("  {}", feedback.timing_message);
    }
    for issue in &feedback.issues {
        println!("  - {}: {}", issue.issue_type, issue.description);
    }
}

fn print_error(error: eval_core::RealTimeError) {
    println!("{} {}", "[error]".red(), error.message);
}
