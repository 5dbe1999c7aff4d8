use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;
use moodle_dump_core::{
    HttpClient, Layout, RetryPolicy, SyncEngine, SyncOptions, WebserviceClient,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::{config_manager, course_selection, exit_handler, summary, terminal};
use crate::cli::Args;

pub(crate) async fn run() -> Result<ProcessExit> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    terminal::init_tracing(terminal::default_log_level(args.quiet, args.verbose));
    debug!(?args, "CLI arguments parsed");

    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env file"),
        Err(error) if error.not_found() => {}
        Err(error) => warn!(error = %error, "ignoring unreadable .env file"),
    }

    let settings = config_manager::load_settings(&args)?;
    info!(
        site = %settings.site,
        username = %settings.username,
        output_dir = %settings.output_dir.display(),
        "moodle-dump starting"
    );

    let retry_policy = RetryPolicy::with_max_attempts(settings.max_retries);

    let mut client = WebserviceClient::with_timeout(&settings.site, settings.timeout)
        .context("Failed to create webservice client")?
        .with_retry_policy(retry_policy.clone());
    client
        .login(&settings.username, &settings.password)
        .await
        .context("Login failed")?;

    let site_info = client
        .site_info()
        .await
        .context("Failed to fetch site info")?;
    let Some(user_id) = site_info.user_id else {
        bail!("Site info did not include a user id");
    };
    let access_key = site_info.access_key().map(str::to_string);
    if access_key.is_none() {
        warn!("Site did not provide a private access key; files will be skipped");
    }
    info!(user_id, site_name = %site_info.site_name, "Authenticated");

    let courses = client
        .user_courses(user_id)
        .await
        .context("Failed to list enrolled courses")?;
    if courses.is_empty() {
        bail!("No enrolled courses found for user {user_id}");
    }
    let courses = course_selection::select_courses(courses, &settings.courses)?;
    info!(courses = courses.len(), "Enrolled courses fetched");

    let fetcher = HttpClient::with_timeout(settings.download_timeout)
        .context("Failed to create download client")?
        .with_retry_policy(retry_policy);
    let layout = Layout::new(settings.aliases.clone())
        .with_full_sanitizer(settings.full_sanitizer)
        .with_numbering(settings.dump_all);
    let engine = SyncEngine::new(
        Arc::new(client),
        Arc::new(fetcher),
        layout,
        access_key,
        SyncOptions {
            concurrency: settings.concurrency,
            write_metadata: settings.dump_all,
        },
    )?;

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory '{}'",
                settings.output_dir.display()
            )
        })?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let report = engine
        .sync_interruptible(&courses, &settings.output_dir, args.force, interrupted)
        .await;

    summary::log_report(&report);
    Ok(exit_handler::determine_exit_outcome(&report))
}
