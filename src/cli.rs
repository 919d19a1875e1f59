use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use log::info;

use crate::app::App;
use crate::calendar::MonthView;
use crate::error::SessionError;
use crate::settings::PlanDefaults;
use crate::sync::{hydrate, RemoteMirror};
use crate::timer::{
    Eligibility, SessionController, SessionPhase, TickReport, MAX_SLACK_MINUTES,
    MAX_TOTAL_MINUTES, MIN_TOTAL_MINUTES,
};
use crate::utils::time::local_day;
use crate::vision::ImageFileSource;

/// prove cardio sessions with camera snapshots of the machine you are on
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    /// print machine-readable JSON instead of text where supported
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// list configured machines and their enrollment
    Machines,
    /// add a machine to the rotation
    AddMachine { name: String },
    /// remove a machine and its references
    RemoveMachine { name: String },
    /// store reference fingerprints for a machine from image files
    Enroll {
        machine: String,
        #[clap(required = true)]
        images: Vec<PathBuf>,
    },
    /// generate a randomized plan for today
    Plan {
        /// total minutes (defaults to the last value used)
        #[clap(short, long, value_parser = clap::value_parser!(u32).range(MIN_TOTAL_MINUTES as i64..=MAX_TOTAL_MINUTES as i64))]
        total: Option<u32>,
        /// minutes of slack either side of each segment target
        #[clap(short, long, value_parser = clap::value_parser!(u32).range(0..=MAX_SLACK_MINUTES as i64))]
        slack: Option<u32>,
    },
    /// start the planned session
    Start,
    /// show the active segment and its window
    Status,
    /// follow the active segment until it leaves its window
    Watch,
    /// submit a snapshot for the active segment
    Capture { image: PathBuf },
    /// abandon the current session
    Reset,
    /// show the workout calendar
    Calendar {
        /// month to show as YYYY-MM
        #[clap(long, conflicts_with = "offset")]
        month: Option<String>,
        /// months relative to the current one
        #[clap(long, allow_hyphen_values = true)]
        offset: Option<i32>,
    },
    /// print enrollment references as JSON
    ExportEnrollment {
        #[clap(short, long)]
        out: Option<PathBuf>,
    },
    /// merge enrollment references from a JSON file
    ImportEnrollment { path: PathBuf },
    /// mirror changes for a user and pull their stored data
    SignIn {
        user_id: String,
        #[clap(long)]
        mirror_dir: Option<PathBuf>,
    },
    /// stop mirroring
    SignOut,
    /// push every local map to the mirror
    Sync,
}

impl Cli {
    pub async fn execute(self, app: &App) -> Result<()> {
        let json = self.json;
        match self.command {
            Command::Machines => list_machines(app, json).await,
            Command::AddMachine { name } => {
                if app.registry.add(&name).await? {
                    println!("added {}", name.trim());
                } else {
                    println!("{} already exists", name.trim());
                }
                Ok(())
            }
            Command::RemoveMachine { name } => {
                app.registry.remove(&name).await?;
                println!("removed {name}");
                Ok(())
            }
            Command::Enroll { machine, images } => enroll(app, &machine, images).await,
            Command::Plan { total, slack } => plan(app, total, slack, json).await,
            Command::Start => {
                let controller = idle_controller(app).await?;
                let status = controller.start().await?;
                println!("{}", status.heading());
                println!("{}", status.window.label());
                controller.shutdown().await;
                Ok(())
            }
            Command::Status => {
                let controller = idle_controller(app).await?;
                let report = controller.report().await;
                let plan = controller.state().await.plan().clone();
                controller.shutdown().await;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    return Ok(());
                }
                match report.phase {
                    SessionPhase::Idle | SessionPhase::Completed => println!("no active session"),
                    SessionPhase::Planned => {
                        println!("planned, not started:");
                        for (i, segment) in plan.segments().iter().enumerate() {
                            println!("  {}. {} ({} min)", i + 1, segment.machine, segment.minutes);
                        }
                    }
                    SessionPhase::InSegment => print_report(&report),
                }
                Ok(())
            }
            Command::Watch => watch(app).await,
            Command::Capture { image } => capture(app, image, json).await,
            Command::Reset => {
                let controller = idle_controller(app).await?;
                controller.reset().await?;
                println!("session reset");
                Ok(())
            }
            Command::Calendar { month, offset } => calendar(app, month, offset, json).await,
            Command::ExportEnrollment { out } => {
                let document = app.registry.export_enrollment().await?;
                match out {
                    Some(path) => {
                        std::fs::write(&path, document)
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        println!("wrote {}", path.display());
                    }
                    None => println!("{document}"),
                }
                Ok(())
            }
            Command::ImportEnrollment { path } => {
                let document = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let count = app.registry.import_enrollment(&document).await?;
                println!("imported references for {count} machine(s)");
                Ok(())
            }
            Command::SignIn { user_id, mirror_dir } => sign_in(app, user_id, mirror_dir).await,
            Command::SignOut => {
                app.settings.sign_out()?;
                println!("signed out; changes stay local");
                Ok(())
            }
            Command::Sync => {
                let user_id = app
                    .settings
                    .sync()
                    .user_id
                    .ok_or_else(|| anyhow!("not signed in"))?;
                let mirror = RemoteMirror::new(user_id.clone(), Arc::new(app.remote_store()));
                mirror.push_all(&app.db).await?;
                println!("pushed local data for {user_id}");
                Ok(())
            }
        }
    }
}

/// Controller for commands that never touch the camera.
async fn idle_controller(app: &App) -> Result<SessionController<ImageFileSource>> {
    let controller = app.session_controller(ImageFileSource::new(PathBuf::new()));
    controller.resume().await?;
    Ok(controller)
}

async fn list_machines(app: &App, json: bool) -> Result<()> {
    let machines = app.registry.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&machines)?);
        return Ok(());
    }
    for machine in machines {
        let detail = match (machine.enrolled, machine.aspect_ratio) {
            (false, _) => "not enrolled".to_string(),
            (true, Some(ratio)) => format!("{} reference(s), aspect {ratio:.2}", machine.reference_count),
            (true, None) => format!("{} reference(s)", machine.reference_count),
        };
        println!("{:<20} {detail}", machine.name);
    }
    Ok(())
}

async fn enroll(app: &App, machine: &str, images: Vec<PathBuf>) -> Result<()> {
    for path in images {
        let decoded = image::open(&path)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        let frame = crate::vision::Frame::from_image(decoded)?;
        let receipt = app.registry.enroll_frame(machine, &frame).await?;
        println!(
            "{}: stored {} ({} reference(s))",
            receipt.machine,
            path.display(),
            receipt.reference_count
        );
    }
    Ok(())
}

async fn plan(app: &App, total: Option<u32>, slack: Option<u32>, json: bool) -> Result<()> {
    let defaults = app.settings.plan_defaults();
    let chosen = PlanDefaults {
        total_minutes: total.unwrap_or(defaults.total_minutes),
        slack_minutes: slack.unwrap_or(defaults.slack_minutes),
    };

    let controller = idle_controller(app).await?;
    let plan = controller
        .plan(chosen.total_minutes, chosen.slack_minutes)
        .await?;
    if chosen != defaults {
        app.settings.update_plan_defaults(chosen)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    println!(
        "{} min, slack {} min:",
        chosen.total_minutes, chosen.slack_minutes
    );
    for (i, segment) in plan.segments().iter().enumerate() {
        println!("  {}. {} ({} min)", i + 1, segment.machine, segment.minutes);
    }
    Ok(())
}

async fn watch(app: &App) -> Result<()> {
    let controller = idle_controller(app).await?;
    let mut reports = controller.subscribe();
    if reports.borrow().phase != SessionPhase::InSegment {
        controller.shutdown().await;
        bail!("no segment in progress");
    }

    loop {
        let report = reports.borrow_and_update().clone();
        print_report(&report);
        let finished = report.phase != SessionPhase::InSegment
            || report
                .segment
                .as_ref()
                .is_some_and(|s| s.eligibility == Eligibility::TooLate);
        if finished {
            break;
        }

        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    controller.shutdown().await;
    Ok(())
}

async fn capture(app: &App, image: PathBuf, json: bool) -> Result<()> {
    let controller = app.session_controller(ImageFileSource::new(&image));
    controller.resume().await?;
    controller.open_camera().await?;

    let result = controller.capture().await;
    controller.shutdown().await;
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if let Some(session_err) = err.downcast_ref::<SessionError>() {
                if session_err.is_retryable() {
                    return Err(err.context("capture rejected; try again"));
                }
            }
            return Err(err);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    if let Some(score) = report.verdict.best_score {
        info!("match score {score}");
    }
    if report.completed {
        println!("session complete; today is marked done");
    } else if let Some(next) = report.next {
        println!("verified. next: {}", next.heading());
        println!("{}", next.window.label());
    }
    Ok(())
}

async fn calendar(app: &App, month: Option<String>, offset: Option<i32>, json: bool) -> Result<()> {
    let record = app.db.load_calendar().await?;
    let today = local_day(Utc::now());

    let view = match month {
        Some(raw) => {
            let first = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
                .with_context(|| format!("expected YYYY-MM, got {raw}"))?;
            MonthView::build(first.year(), first.month(), &record, today)
        }
        None => MonthView::containing(today, &record, today)
            .and_then(|current| current.shifted(offset.unwrap_or(0), &record, today)),
    }
    .ok_or_else(|| anyhow!("month out of range"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", view.render());
        println!("{} day(s) done", view.done_count());
    }
    Ok(())
}

async fn sign_in(app: &App, user_id: String, mirror_dir: Option<PathBuf>) -> Result<()> {
    app.settings.sign_in(user_id.clone(), mirror_dir)?;
    let store = app.remote_store();
    let report = hydrate(&app.db, &store, &user_id).await?;
    if report.any() {
        println!("signed in as {user_id}; pulled stored data");
    } else {
        println!("signed in as {user_id}");
    }
    Ok(())
}

fn print_report(report: &TickReport) {
    match &report.segment {
        Some(status) => {
            println!("{}  {}", status.heading(), status.countdown());
            println!("  {}", status.window.label());
            println!("  {}", status.eligibility);
        }
        None => println!("no active segment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn plan_total_is_range_checked() {
        assert!(Cli::try_parse_from(["gymproof", "plan", "--total", "4"]).is_err());
        assert!(Cli::try_parse_from(["gymproof", "plan", "--total", "241"]).is_err());
        assert!(Cli::try_parse_from(["gymproof", "plan", "--slack", "6"]).is_err());

        let cli = Cli::try_parse_from(["gymproof", "plan", "-t", "45", "-s", "2"]).unwrap();
        match cli.command {
            Command::Plan { total, slack } => {
                assert_eq!(total, Some(45));
                assert_eq!(slack, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn calendar_accepts_negative_offset() {
        let cli = Cli::try_parse_from(["gymproof", "calendar", "--offset", "-1"]).unwrap();
        assert!(matches!(cli.command, Command::Calendar { offset: Some(-1), month: None }));
    }

    #[test]
    fn enroll_requires_an_image() {
        assert!(Cli::try_parse_from(["gymproof", "enroll", "Bike"]).is_err());
    }
}
