use clap::Parser;
use speechset::backends::Backends;
use speechset::cli::{parse_speaker_pair, Cli, Commands};
use speechset::config::AppConfig;
use speechset::error::{Result, SpeechsetError};
use speechset::pipeline::{Orchestrator, RunOptions};
use speechset::progress::{ConsoleReporter, NullSink, ProgressSink};
use speechset::project::Project;
use speechset::speaker_db::{self, SharedSpeakerDb};
use speechset::validation::ValidationEngine;
use speechset::{logging, stats};
use std::path::PathBuf;
use std::sync::Arc;

fn main() {
    // clap itself exits with 2 on invalid arguments.
    let cli = Cli::parse();
    logging::init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_default(&config_path)?.with_env_overrides();
    let sink: Arc<dyn ProgressSink> = if cli.quiet {
        Arc::new(NullSink)
    } else {
        Arc::new(ConsoleReporter::new())
    };

    match cli.command {
        Commands::Process {
            project,
            file,
            override_all,
            segment,
            skip,
        } => {
            let project = Project::open(&config.storage.projects_dir, &project)?;
            let raw = resolve_raw_file(&project, &file)?;
            let options = RunOptions {
                override_all,
                force_segment: segment,
                skip_segment: skip,
                ..RunOptions::default()
            };
            let orchestrator = build_orchestrator(&config, project, options)?.with_sink(sink);
            match orchestrator.process_file(&raw) {
                Ok(()) => Ok(0),
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    eprintln!("Error: {e}");
                    Ok(1)
                }
            }
        }

        Commands::Run {
            project,
            override_all,
            segment,
            validate,
            clean,
            meta,
            copy,
            skip,
        } => {
            let project = Project::open(&config.storage.projects_dir, &project)?;
            let options = RunOptions {
                override_all,
                force_segment: segment,
                skip_segment: skip,
                validate,
                clean,
                meta,
                copy,
                ..RunOptions::default()
            };
            let orchestrator = build_orchestrator(&config, project, options)?.with_sink(sink);
            let summary = orchestrator.run_project()?;
            for (file, error) in &summary.failed {
                eprintln!("failed: {file}: {error}");
            }
            Ok(summary.exit_code())
        }

        Commands::Validate {
            project,
            max_workers,
            threshold,
            delete_bad,
        } => {
            let project = Project::open(&config.storage.projects_dir, &project)?;
            let settings = &project.settings;
            let asr = config.build_asr()?;
            let engine = ValidationEngine::new(
                asr,
                &settings.language,
                threshold.unwrap_or(settings.validation_threshold),
                max_workers.unwrap_or(settings.max_workers),
            )
            .with_sink(sink)
            .with_delete_bad(delete_bad);

            let summary = engine.run(&project)?;
            println!(
                "validated {} segments ({} skipped): {} bad, {} errors",
                summary.checked, summary.skipped, summary.bad, summary.errors
            );
            Ok(0)
        }

        Commands::Stats { project } => {
            let project = Project::open(&config.storage.projects_dir, &project)?;
            let durations = stats::speaker_stats(&project)?;
            print!("{}", stats::render_table(&durations));
            Ok(0)
        }

        Commands::Join { project, speakers } => {
            let project = Project::open(&config.storage.projects_dir, &project)?;
            let (a, b) = parse_speaker_pair(&speakers).ok_or_else(|| {
                SpeechsetError::ConfigInvalidValue {
                    key: "--speakers".to_string(),
                    message: "expected two speaker ids, e.g. 0,3".to_string(),
                }
            })?;
            let remap = speaker_db::join_speakers(&project, a, b)?;
            println!("merged speaker {b} into {a}");
            for (old, new) in remap {
                if old != new {
                    println!("  speaker_{old:02} -> speaker_{new:02}");
                }
            }
            Ok(0)
        }

        Commands::Recheck {
            project,
            threshold,
            apply,
        } => {
            let project = Project::open(&config.storage.projects_dir, &project)?;
            let tau = threshold.unwrap_or_else(|| project.settings.similarity_threshold());
            let db = SharedSpeakerDb::open(&project.speaker_db_path())?;

            let plan = if apply {
                db.apply_recheck(tau)?
            } else {
                db.recheck(tau)?
            };
            let changed = plan
                .iter()
                .filter(|e| e.new_speaker_id != e.speaker_id)
                .count();
            println!(
                "{} embeddings, {} would move at threshold {tau}{}",
                plan.len(),
                changed,
                if apply { " (applied)" } else { "" }
            );
            for entry in plan.iter().filter(|e| e.new_speaker_id != e.speaker_id) {
                println!(
                    "  speaker {} embedding {} -> speaker {} (similarity {:.3})",
                    entry.speaker_id,
                    entry.embedding_index,
                    entry.new_speaker_id,
                    entry.similarity
                );
            }
            Ok(0)
        }

        Commands::Export { project } => {
            let project = Project::open(&config.storage.projects_dir, &project)?;
            let orchestrator =
                build_orchestrator(&config, project, RunOptions::default())?.with_sink(sink);
            let count = orchestrator.export_project()?;
            println!("exported {count} clips");
            Ok(0)
        }
    }
}

fn build_orchestrator(
    config: &AppConfig,
    project: Project,
    options: RunOptions,
) -> Result<Orchestrator> {
    let backends: Backends = config.build_backends(project.settings.diarization_backend)?;
    Orchestrator::new(project, backends, options)
}

/// Find a raw file by exact name, or by stem when the extension was
/// omitted.
fn resolve_raw_file(project: &Project, file: &str) -> Result<PathBuf> {
    let direct = project.raw_dir().join(file);
    if direct.exists() {
        return Ok(direct);
    }
    for candidate in project.raw_files()? {
        if Project::file_stem(&candidate) == file {
            return Ok(candidate);
        }
    }
    Err(SpeechsetError::Input {
        path: direct,
        message: "not found in the project's raw directory".to_string(),
    })
}
