//! TASKMON demo entry point.
//!
//! Simulates a multi-phase import against a [`TaskMonitor`] and prints
//! progress as it arrives. `RUST_LOG` controls tracing output and
//! `TASKMON_LOG_FORMAT=json` switches it to JSON lines; the monitor itself
//! reads the `TASKMON_*` variables understood by [`MonitorConfig::from_env`].

use clap::Parser;
use std::process::ExitCode;
use std::thread::sleep;
use std::time::Duration;
use taskmon_core::{ActivityResult, MonitorConfig, TaskResult};
use taskmon_monitor::{AllocationHandle, MonitorEvent, NewActivity, TaskMonitor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug, Clone)]
#[command(name = "taskmon-demo", about = "Run a simulated task under a TASKMON monitor")]
struct Args {
    /// Number of phases to run
    #[arg(short = 'p', long, default_value = "3")]
    phases: u32,

    /// Items processed per phase
    #[arg(short = 'n', long, default_value = "5")]
    items: u64,

    /// Delay per item, in milliseconds
    #[arg(short = 'd', long, default_value = "20")]
    delay_ms: u64,

    /// Print every status report as a JSON line
    #[arg(long, action = clap::ArgAction::SetTrue)]
    json: bool,

    /// Fail the last phase
    #[arg(long, action = clap::ArgAction::SetTrue)]
    fail: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("taskmon=debug,info"));
    let json = std::env::var("TASKMON_LOG_FORMAT").is_ok_and(|f| f == "json");

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to init tracing subscriber: {}", e);
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    match run(&args) {
        Ok(ActivityResult::Failed) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Demo aborted");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> TaskResult<ActivityResult> {
    let monitor = TaskMonitor::with_config(
        "Demo import",
        format!("{} phase(s) of {} item(s)", args.phases, args.items),
        MonitorConfig::from_env(),
    )?;
    subscribe_printer(&monitor, args.json)?;

    let delay = Duration::from_millis(args.delay_ms);
    for phase in 1..=args.phases {
        let allocation = monitor.allocate(0.0, NewActivity::group(format!("Phase {}", phase)))?;
        let fail = args.fail && phase == args.phases;
        run_phase(&allocation, phase, args.items, delay, fail)?;
        allocation.end()?;
    }

    let result = monitor.finish()?;
    print_summary(&monitor, result, args.json)?;
    Ok(result)
}

fn run_phase(
    allocation: &AllocationHandle,
    phase: u32,
    items: u64,
    delay: Duration,
    fail: bool,
) -> TaskResult<()> {
    if let Some(rows) = allocation.start_activity(70.0, NewActivity::process_items("Rows", items))? {
        for item in 1..=items {
            sleep(delay);
            rows.increment_progress()?;
            if phase == 2 && item == items / 2 {
                rows.log_warning(format!("Row {} skipped: checksum mismatch", item))?;
            }
        }
        if fail {
            rows.fail("Target table is locked")?;
        } else {
            rows.end()?;
        }
    }

    // Verification gets its own nested allocation.
    if let Some(verify) = allocation.allocate(0.0, NewActivity::group("Verify"))? {
        let expected = delay * u32::try_from(items).unwrap_or(u32::MAX);
        if let Some(checksum) = verify.start_activity(0.0, NewActivity::timed("Checksum", expected))? {
            for _ in 0..items {
                sleep(delay);
                checksum.tick()?;
            }
            checksum.end()?;
        }
        verify.end()?;
    }
    Ok(())
}

fn subscribe_printer(monitor: &TaskMonitor, json: bool) -> TaskResult<()> {
    monitor.subscribe_fn(move |event| match event {
        MonitorEvent::TaskUpdated { report } if json => match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize status report"),
        },
        MonitorEvent::TaskUpdated { report } => {
            let current = report
                .deepest_activity()
                .map(|a| format!("{}: {}", a.name, a.description))
                .unwrap_or_default();
            println!("[{:>3}%] {}", report.percent_complete(), current);
        }
        MonitorEvent::LogUpdated { messages } if !json => {
            for message in messages.iter().filter(|m| m.is_error() || m.is_warning()) {
                println!("       {}", message);
            }
        }
        _ => {}
    })?;
    Ok(())
}

fn print_summary(monitor: &TaskMonitor, result: ActivityResult, json: bool) -> TaskResult<()> {
    let errors = monitor.error_count()?;
    let warnings = monitor.warning_count()?;
    if json {
        let summary = serde_json::json!({
            "task_id": monitor.task_id(),
            "result": result,
            "errors": errors,
            "warnings": warnings,
            "messages": monitor.messages()?.len(),
        });
        println!("{}", summary);
    } else {
        println!();
        println!("Result: {} ({} error(s), {} warning(s))", result, errors, warnings);
        if let Some(exception) = monitor.exception(false)? {
            for link in exception.chain() {
                println!("  caused by: {}", link);
            }
        }
    }
    Ok(())
}
