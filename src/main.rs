mod config;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use keepsake::api::types::Asset;
use keepsake::countdown::{self, ValentineStatus};
use keepsake::state::actions::{self, NewMilestone};
use keepsake::state::{Category, FileStore, ItemId, KvStore, MemoryStore};
use keepsake::sync::SyncStatus;
use keepsake::{AppStore, Cloud, Identity, SupabaseClient, SyncEngine};

// Re-export library modules so binary-internal modules can use crate::error:: and friends
pub(crate) use keepsake::{api, error, state};

const DEFAULT_SHARE_BASE: &str = "https://keepsake.app/";

#[derive(Parser)]
#[command(name = "keepsake", version, about = "Your shared couple keepsake, synced")]
struct Cli {
    /// Shared link to enter through, e.g. https://keepsake.app/?couple=<id>
    #[arg(long, global = true)]
    link: Option<String>,

    /// Config file [default: $XDG_CONFIG_HOME/keepsake/config.toml]
    #[arg(long, global = true, env = "KEEPSAKE_CONFIG")]
    config: Option<PathBuf>,

    /// Keep state in memory only; nothing is read from or written to disk
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print everything stored for the couple
    Show,
    /// Set both names and the anniversary
    Onboard {
        partner1: String,
        partner2: String,
        /// YYYY-MM-DD
        #[arg(long, default_value = "")]
        anniversary: String,
    },
    #[command(subcommand)]
    Timeline(TimelineCommand),
    #[command(subcommand)]
    Reason(ReasonCommand),
    #[command(subcommand)]
    Bucket(BucketCommand),
    #[command(subcommand)]
    Quiz(QuizCommand),
    #[command(subcommand)]
    Letter(LetterCommand),
    #[command(subcommand)]
    Gift(GiftCommand),
    /// Set the couple photo
    Photo { path: PathBuf },
    /// Toggle dark mode on this device
    Dark,
    /// Print the link that lets a partner join
    Share {
        #[arg(long, default_value = DEFAULT_SHARE_BASE)]
        base: String,
    },
    /// Join the couple named by a shared link
    Open { url: String },
    /// Pull the cloud copy and push local changes
    Sync,
    /// Time until Valentine's day and days together
    Countdown,
}

#[derive(Subcommand)]
enum TimelineCommand {
    Add {
        title: String,
        /// YYYY-MM-DD
        date: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    Rm { id: ItemId },
}

#[derive(Subcommand)]
enum ReasonCommand {
    Add { text: String },
    Rm { id: ItemId },
}

#[derive(Subcommand)]
enum BucketCommand {
    Add {
        text: String,
        #[arg(long, default_value = "Travel", value_parser = parse_category)]
        category: Category,
    },
    /// Toggle an item's done flag
    Done { id: ItemId },
    Rm { id: ItemId },
}

#[derive(Subcommand)]
enum QuizCommand {
    Add { question: String, answer: String },
    Rm { id: ItemId },
    /// Answer every question from stdin
    Play,
}

#[derive(Subcommand)]
enum LetterCommand {
    Write { message: String },
    Open,
}

#[derive(Subcommand)]
enum GiftCommand {
    Write {
        message: String,
        #[arg(long = "coupon")]
        coupons: Vec<String>,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    Open,
    Close,
}

fn parse_category(s: &str) -> std::result::Result<Category, String> {
    Category::parse(s).ok_or_else(|| {
        let names: Vec<&str> = Category::ALL.iter().map(Category::label).collect();
        format!("expected one of {}", names.join(", "))
    })
}

fn config_path() -> PathBuf {
    AppConfig::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("KEEPSAKE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let path = cli.config.clone().unwrap_or_else(config_path);
    if !path.exists() {
        AppConfig::write_default(&path)?;
        eprintln!(
            "Created default config at: {}\nAdd your cloud url and anon_key there to sync; until then everything stays on this device.",
            path.display()
        );
    }

    let config = match AppConfig::load_from_path(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            eprintln!("Fix the config file or delete it to regenerate defaults.");
            return Ok(());
        }
    };

    let kv: Arc<dyn KvStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let data_dir = config
            .data_dir()
            .ok_or("could not determine a data directory; set storage.data_dir")?;
        Arc::new(FileStore::open(&data_dir)?)
    };
    let store = AppStore::open(Arc::clone(&kv));

    let location = match &cli.command {
        Command::Open { url } => Some(url.as_str()),
        _ => cli.link.as_deref(),
    };
    let identity = Identity::resolve(kv, location);

    let cloud = if config.cloud_enabled() {
        Cloud::new(Arc::new(SupabaseClient::new(
            &config.cloud.url,
            &config.cloud.anon_key,
            &config.cloud.bucket,
        )))
    } else {
        Cloud::disabled()
    };

    let sync = cloud.remote().map(|remote| {
        SyncEngine::new(remote, store.clone(), identity.clone())
            .with_debounce(config.debounce())
            .spawn()
    });

    // Start from the cloud copy so a command never clobbers a partner's edits
    if let Some(handle) = &sync {
        handle.settled().await;
    }

    let result = run(cli.command, &store, &identity, &cloud).await;

    if let Some(handle) = sync {
        let status = handle.settled().await;
        report(&status);
        handle.shutdown().await;
    }

    result?;
    Ok(())
}

async fn run(
    command: Command,
    store: &AppStore,
    identity: &Identity,
    cloud: &Cloud,
) -> error::Result<()> {
    match command {
        Command::Show => show(store, identity),
        Command::Onboard {
            partner1,
            partner2,
            anniversary,
        } => {
            actions::complete_onboarding(store, &partner1, &partner2, &anniversary)?;
            println!("Welcome, {} & {}", partner1.trim(), partner2.trim());
        }
        Command::Timeline(TimelineCommand::Add {
            title,
            date,
            description,
            icon,
            photo,
        }) => {
            let photo = match photo {
                Some(path) => Some(upload(cloud, identity, &path, "timeline").await?),
                None => None,
            };
            let id = actions::add_milestone(
                store,
                NewMilestone {
                    title,
                    date,
                    description,
                    icon,
                    photo,
                },
            )?;
            println!("Added milestone {}", id);
        }
        Command::Timeline(TimelineCommand::Rm { id }) => {
            removed(actions::remove_milestone(store, id)?, "milestone", id)
        }
        Command::Reason(ReasonCommand::Add { text }) => {
            let id = actions::add_reason(store, &text)?;
            println!(
                "Added reason {} ({}/{})",
                id,
                store.get().reasons.len(),
                actions::MAX_REASONS
            );
        }
        Command::Reason(ReasonCommand::Rm { id }) => {
            removed(actions::remove_reason(store, id)?, "reason", id)
        }
        Command::Bucket(BucketCommand::Add { text, category }) => {
            let id = actions::add_bucket_item(store, &text, category)?;
            println!("Added {} item {}", category.label(), id);
        }
        Command::Bucket(BucketCommand::Done { id }) => {
            let done = actions::toggle_bucket_item(store, id)?;
            let (finished, total) = actions::bucket_progress(&store.get().bucket_list);
            println!(
                "Item {} {} ({}/{} done)",
                id,
                if done { "done" } else { "reopened" },
                finished,
                total
            );
        }
        Command::Bucket(BucketCommand::Rm { id }) => {
            removed(actions::remove_bucket_item(store, id)?, "bucket list item", id)
        }
        Command::Quiz(QuizCommand::Add { question, answer }) => {
            let id = actions::add_question(store, &question, &answer)?;
            println!("Added question {}", id);
        }
        Command::Quiz(QuizCommand::Rm { id }) => {
            removed(actions::remove_question(store, id)?, "question", id)
        }
        Command::Quiz(QuizCommand::Play) => play_quiz(store).await?,
        Command::Letter(LetterCommand::Write { message }) => {
            actions::save_letter(store, &message)?;
            println!("Letter sealed");
        }
        Command::Letter(LetterCommand::Open) => {
            actions::open_letter(store)?;
            println!("{}", store.get().love_letter.message);
        }
        Command::Gift(GiftCommand::Write {
            message,
            coupons,
            photo,
        }) => {
            let photo = match photo {
                Some(path) => Some(upload(cloud, identity, &path, "gift").await?),
                None => None,
            };
            actions::save_gift(store, &message, photo, coupons)?;
            println!("Gift wrapped");
        }
        Command::Gift(GiftCommand::Open) => {
            actions::open_gift(store)?;
            let gift = store.get().gift_box;
            println!("{}", gift.message);
            for coupon in &gift.coupons {
                println!("  * {}", coupon);
            }
            if let Some(photo) = &gift.photo {
                println!("  photo: {}", preview(photo));
            }
        }
        Command::Gift(GiftCommand::Close) => actions::close_gift(store)?,
        Command::Photo { path } => {
            let reference = upload(cloud, identity, &path, "couple").await?;
            println!("Couple photo set: {}", preview(&reference));
            actions::set_couple_photo(store, reference)?;
        }
        Command::Dark => {
            let dark = actions::toggle_dark_mode(store)?;
            println!("Dark mode {}", if dark { "on" } else { "off" });
        }
        Command::Share { base } => match identity.couple_id() {
            Some(_) => println!("{}", identity.share_link(&base)?),
            None => eprintln!("Nothing to share yet: finish onboarding with cloud sync enabled"),
        },
        Command::Open { .. } => match identity.couple_id() {
            Some(id) => println!("Joined couple {}", id),
            None => eprintln!("That link has no couple in it"),
        },
        Command::Sync => {
            if !cloud.is_configured() {
                eprintln!("Cloud sync is not configured; set cloud.url and cloud.anon_key");
            }
        }
        Command::Countdown => print_countdown(store),
    }
    Ok(())
}

async fn upload(
    cloud: &Cloud,
    identity: &Identity,
    path: &std::path::Path,
    purpose: &str,
) -> error::Result<String> {
    let asset = Asset::from_path(path)?;
    Ok(cloud
        .resolve_asset(identity.couple_id().as_ref(), &asset, purpose)
        .await)
}

async fn play_quiz(store: &AppStore) -> error::Result<()> {
    actions::start_quiz(store)?;
    let questions = store.get().quiz.questions;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    for (index, question) in questions.iter().enumerate() {
        println!("Q{}: {}", index + 1, question.q);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            println!("  skipped");
            continue;
        }
        let outcome = actions::submit_answer(store, index, &line)?;
        if outcome.correct {
            println!("  correct!");
        } else {
            println!("  not quite: {}", question.a);
        }
        if outcome.completed {
            println!("Score: {}/{}", outcome.score, questions.len());
        }
    }
    Ok(())
}

fn removed(found: bool, what: &str, id: ItemId) {
    if found {
        println!("Removed {} {}", what, id);
    } else {
        eprintln!("No {} with id {}", what, id);
    }
}

fn preview(reference: &str) -> &str {
    if reference.starts_with("data:") {
        "(inline image)"
    } else {
        reference
    }
}

fn show(store: &AppStore, identity: &Identity) {
    let state = store.get();
    if !state.onboarded {
        println!("Not onboarded yet: run `keepsake onboard <partner1> <partner2>`");
        return;
    }

    println!("{} & {}", state.partner1, state.partner2);
    if let Some(date) = state.anniversary_date() {
        println!("Together since {}", date);
    }
    if let Some(photo) = &state.couple_photo {
        println!("Photo: {}", preview(photo));
    }
    match identity.couple_id() {
        Some(id) if identity.is_shared_view() => println!("Couple: {} (joined by link)", id),
        Some(id) => println!("Couple: {}", id),
        None => println!("Couple: local only"),
    }

    println!("\nTimeline");
    for m in &state.timeline {
        println!("  [{}] {} {} {}", m.id, m.date, m.icon, m.title);
    }

    println!("\nReasons ({}/{})", state.reasons.len(), actions::MAX_REASONS);
    for r in &state.reasons {
        println!("  [{}] {}", r.id, r.text);
    }

    let (done, total) = actions::bucket_progress(&state.bucket_list);
    println!("\nBucket list ({}/{} done)", done, total);
    for category in Category::ALL {
        for item in state.bucket_list.iter().filter(|b| b.category == category) {
            let mark = if item.done { "x" } else { " " };
            println!("  [{}] ({}) {} {}", mark, item.id, category.label(), item.text);
        }
    }

    println!("\nQuiz: {} questions", state.quiz.questions.len());
    if state.quiz.completed {
        println!("  last score {}/{}", state.quiz.score, state.quiz.questions.len());
    }
    for q in &state.quiz.questions {
        println!("  [{}] {}", q.id, q.q);
    }

    println!(
        "\nLove letter: {}",
        match (state.love_letter.message.is_empty(), state.love_letter.opened) {
            (true, _) => "not written",
            (false, true) => "opened",
            (false, false) => "sealed",
        }
    );
    println!(
        "Gift box: {}",
        match (state.gift_box.message.is_empty(), state.gift_box.opened) {
            (true, _) => "empty",
            (false, true) => "opened",
            (false, false) => "wrapped",
        }
    );
}

fn print_countdown(store: &AppStore) {
    let now = Local::now();
    match countdown::valentine_status(now.naive_local()) {
        ValentineStatus::Today => println!("Happy Valentine's Day!"),
        ValentineStatus::Before | ValentineStatus::After => {
            let left = countdown::time_until_valentine(now.naive_local());
            println!(
                "{}d {:02}h {:02}m {:02}s until Valentine's Day",
                left.days, left.hours, left.minutes, left.seconds
            );
        }
    }
    if let Some(start) = store.get().anniversary_date() {
        let days = countdown::days_together(start, now.date_naive());
        if days >= 0 {
            println!("{} days together", days);
        }
    }
}

fn report(status: &SyncStatus) {
    match status.notice() {
        Some(notice) => {
            eprintln!("{}: {}", notice.title, notice.message);
            eprintln!("  {}", notice.hint);
        }
        None => tracing::info!(status = %status.label(), "sync settled"),
    }
}
