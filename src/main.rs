use flexi_logger::{DeferredNow, FileSpec, Logger, LoggerHandle, WriteMode};
use log::error;
use std::process;
use tcga_classify::cinfo;
use tcga_classify::param::{self, Param};
use tcga_classify::run;

fn custom_format(w: &mut dyn std::io::Write, now: &mut DeferredNow, record: &log::Record) -> std::io::Result<()> {
    write!(w, "{} [{}] {}", now.now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.args())
}

fn start_logger(param: &Param) -> Result<LoggerHandle, flexi_logger::FlexiLoggerError> {
    let logger = Logger::try_with_str(&param.general.log_level)?;
    let logger = if !param.general.log_base.is_empty() {
        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        logger
            .log_to_file(
                FileSpec::default()
                    .basename(&param.general.log_base)
                    .suffix(&param.general.log_suffix)
                    .discriminant(&timestamp),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .format_for_files(custom_format)
            .format_for_stderr(custom_format)
    } else {
        logger.write_mode(WriteMode::BufferAndFlush).format_for_stderr(custom_format)
    };
    logger.start()
}

fn main() {
    let param_file = std::env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());
    let param = match param::get(param_file.clone()) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("Cannot load {}: {}", param_file, e);
            process::exit(1);
        }
    };

    let logger = match start_logger(&param) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Cannot start logger: {}", e);
            process::exit(1);
        }
    };

    cinfo!(
        param.general.display_colorful,
        "\x1b[1;96mtcga_classify v{}\x1b[0m | parameters from {}",
        env!("CARGO_PKG_VERSION"),
        param_file
    );

    let code = match run(&param) {
        Ok(summary) => {
            cinfo!(param.general.display_colorful, "{}", summary.display_results());
            if !param.general.save_summary.is_empty() {
                if let Err(e) = summary.save_auto(&param.general.save_summary) {
                    error!("Cannot save run summary to {}: {}", param.general.save_summary, e);
                }
            }
            if summary.failed().is_empty() {
                0
            } else {
                2
            }
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    };

    drop(logger);
    process::exit(code);
}
