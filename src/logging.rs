use std::path::PathBuf;
use std::time::SystemTime;

use color_eyre::Result;
use color_eyre::eyre::Context;
use fern::colors::{Color, ColoredLevelConfig};

/// Chatty dependencies are capped at this level regardless of the requested one.
const NOISY_TARGETS: &[&str] = &["sqlx", "sea_orm", "hyper", "hyper_util", "reqwest"];

/// Console goes to stderr so command output on stdout stays clean.
/// `console_level` defaults to off; the log file, when given, gets `file_level`.
pub fn setup_logging(
    console_level: log::LevelFilter,
    log_file: Option<PathBuf>,
    file_level: log::LevelFilter,
) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::BrightBlack);

    let console = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} [{}] {}",
                humantime::format_rfc3339_seconds(SystemTime::now()),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(console_level)
        .chain(std::io::stderr());

    let mut dispatch = fern::Dispatch::new()
        .level(console_level.max(file_level_or_off(&log_file, file_level)))
        .chain(console);

    for target in NOISY_TARGETS {
        dispatch = dispatch.level_for(*target, log::LevelFilter::Warn);
    }

    if let Some(path) = log_file {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create log directory: {}",
                parent.display()
            ))?;
        }

        let file = fern::log_file(&path)
            .context(format!("Failed to open log file: {}", path.display()))?;
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} {} [{}] {}",
                        humantime::format_rfc3339_millis(SystemTime::now()),
                        record.level(),
                        record.target(),
                        message
                    ))
                })
                .level(file_level)
                .chain(file),
        );
    }

    dispatch.apply().context("Failed to install logger")?;
    Ok(())
}

fn file_level_or_off(log_file: &Option<PathBuf>, file_level: log::LevelFilter) -> log::LevelFilter {
    if log_file.is_some() {
        file_level
    } else {
        log::LevelFilter::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_level_ignored_without_file() {
        assert_eq!(
            file_level_or_off(&None, log::LevelFilter::Debug),
            log::LevelFilter::Off
        );
        assert_eq!(
            file_level_or_off(&Some(PathBuf::from("disq.log")), log::LevelFilter::Debug),
            log::LevelFilter::Debug
        );
    }
}
