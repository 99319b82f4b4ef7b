mod args;

use chrono::Duration;
use quest_core::model::{
    BadgeSet, Category, ExerciseRef, ProgressRecord, SessionStats, SessionTally,
};
use services::{Clock, ProgressConfig, ProgressService, SessionOutcome};
use storage::ExerciseProgress;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::args::{Args, Command, RoundArgs, StatsTarget, print_usage, sqlite_file_path};

fn init_logging() {
    let filter = EnvFilter::try_from_env("QUEST_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_progress(progress: &ProgressRecord, service: &ProgressService) {
    let catalog = service.catalog();
    println!(
        "level {}  badges {}/{}  sessions {}  streak {} day(s)",
        progress.level,
        progress.badge_count(),
        catalog.len(),
        progress.total_sessions,
        progress.streak_days
    );
    if let Some(accuracy) = progress.last_session_accuracy {
        println!("last round accuracy {:.0}%", accuracy * 100.0);
    }

    println!("solved:");
    for category in Category::ALL {
        println!("  {:<22} {}", category.title(), progress.solved_in(category));
    }

    let worn: Vec<String> = progress
        .equipped_badges
        .worn()
        .map(|(slot, id)| {
            let name = catalog.get(id.as_str()).map_or(id.as_str(), |b| b.name);
            format!("{slot:?}: {name}")
        })
        .collect();
    if worn.is_empty() {
        println!("wearing nothing");
    } else {
        println!("wearing {}", worn.join(", "));
    }
}

fn print_catalog(progress: &ProgressRecord, service: &ProgressService) {
    for set in [BadgeSet::SpookyStudy, BadgeSet::GalaxyLab] {
        println!("{}", set.display_name());
        for badge in service.catalog().by_set(set) {
            let mark = if progress.owns(&badge.badge_id()) {
                "x"
            } else {
                " "
            };
            println!(
                "  [{mark}] {:<28} {:<10} {:?}/{:?}  {}",
                badge.id, badge.name, badge.slot, badge.rarity, badge.unlock
            );
        }
    }
}

fn print_outcome(outcome: &SessionOutcome) {
    if outcome.new_badges.is_empty() {
        println!("no new badges this round");
    }
    for badge in &outcome.new_badges {
        let note = if outcome.guaranteed { " (bonus)" } else { "" };
        println!("unlocked {} [{:?}]{note}", badge.name, badge.rarity);
    }
    if outcome.leveled_up {
        println!("level up! now level {}", outcome.progress.level);
    }
    if outcome.collection_complete {
        println!("collection complete");
    }
}

fn print_exercise(stats: &ExerciseProgress) {
    println!(
        "{:<20} {:<16} asked {:>3}  right {:>3}  wrong {:>3}",
        stats.id.as_str(),
        stats.category.key(),
        stats.asked_count,
        stats.correct_count,
        stats.incorrect_count
    );
}

/// Replays the round through a `SessionTally`, one answer at a time.
/// Every correct answer carries the average time, so the tally's mean
/// comes out as the given average.
fn session_from(round: &RoundArgs, clock: Clock) -> SessionStats {
    let ended_at = clock.now();
    #[allow(clippy::cast_possible_truncation)]
    let elapsed = Duration::milliseconds((round.minutes * 60_000.0).round() as i64);
    #[allow(clippy::cast_possible_truncation)]
    let latency = round
        .avg_secs
        .map(|secs| Duration::milliseconds((secs * 1000.0).round() as i64));
    let questions = round
        .questions
        .unwrap_or(round.correct.saturating_add(round.incorrect));

    let mut tally = SessionTally::start(round.category, ended_at - elapsed, questions);
    for _ in 0..round.correct {
        tally.record_answer(true, latency);
    }
    for _ in 0..round.incorrect {
        tally.record_answer(false, None);
    }
    tally.finish(ended_at)
}

fn prepare_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    if let Some(parent) = sqlite_file_path(db_url).and_then(std::path::Path::parent) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Args::parse(std::env::args().skip(1), |key| std::env::var(key).ok()).map_err(
        |e| {
            eprintln!("{e}");
            print_usage();
            e
        },
    )?;
    if parsed.command == Command::Help {
        print_usage();
        return Ok(());
    }

    prepare_sqlite_dir(&parsed.db_url)?;
    debug!(data_dir = %parsed.data_dir.display(), db = %parsed.db_url, "opening progress");
    let config = ProgressConfig::default();
    let clock = config.clock;
    let service = ProgressService::open_dir(config, &parsed.data_dir, &parsed.db_url).await?;

    match parsed.command {
        Command::Show => print_progress(&service.progress(), &service),
        Command::Catalog => print_catalog(&service.progress(), &service),
        Command::Session(round) => {
            let outcome = service.record_session(&session_from(&round, clock));
            print_outcome(&outcome);
        }
        Command::Ask { category, ids } => {
            let batch: Vec<ExerciseRef> = ids
                .into_iter()
                .map(|id| ExerciseRef { id, category })
                .collect();
            service.mark_asked(&batch);
            println!("tracked {} exercise(s)", batch.len());
        }
        Command::Answer {
            category,
            id,
            is_correct,
        } => {
            let progress = service.record_answer(&ExerciseRef { id, category }, is_correct);
            println!(
                "{} solved in {}",
                progress.solved_in(category),
                category.title()
            );
        }
        Command::Equip(id) => {
            service.catalog().require(id.as_str())?;
            let before = service.progress().equipped_badges;
            let after = service.equip(&id).equipped_badges;
            if before == after {
                println!("{id} is not owned");
            } else if after.is_worn(&id) {
                println!("wearing {id}");
            } else {
                println!("took off {id}");
            }
        }
        Command::Unequip(id) => {
            service.catalog().require(id.as_str())?;
            service.unequip(&id);
            println!("took off {id}");
        }
        Command::Stats(StatsTarget::Exercise(id)) => match service.problem_progress(&id).await {
            Some(stats) => print_exercise(&stats),
            None => println!("no history for {id}"),
        },
        Command::Stats(StatsTarget::Category(category)) => {
            let rows = service.problem_progress_in(category).await;
            if rows.is_empty() {
                println!("no history for {}", category.title());
            }
            for stats in &rows {
                print_exercise(stats);
            }
        }
        Command::Help => {}
    }

    // Background durable writes must land before the process exits.
    service.flush().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
