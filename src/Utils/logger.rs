use crate::dae::simulator::SimulationResult;
use chrono::Local;
use csv::Writer;
use itertools::Itertools;
use log::{LevelFilter, info};
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::File;
use std::io::{self, Write};

/// time-stamped log file name like `log_2025-01-31_12-00-00.txt`
pub fn default_log_file_name() -> String {
    let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
    format!("log_{}.txt", date_and_time)
}

/// Terminal logger plus an optional file logger. Returns false when a logger was
/// already installed (the new one is ignored) or when nothing could be set up.
pub fn init_logger(level: LevelFilter, file: Option<&str>) -> bool {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(filename) = file {
        match File::create(filename) {
            Ok(file) => loggers.push(WriteLogger::new(level, Config::default(), file)),
            Err(e) => eprintln!("cannot create log file {}: {}", filename, e),
        }
    }
    CombinedLogger::init(loggers).is_ok()
}

/// Writes a simulation result as a tab separated table:
/// time, every state, then every output column.
pub fn save_result_to_file(result: &SimulationResult, filename: &str) -> io::Result<()> {
    let mut file = File::create(filename)?;
    let headers = std::iter::once("time")
        .chain(result.trajectory.state_names.iter().map(String::as_str))
        .chain(result.output_names.iter().map(String::as_str))
        .join("\t");
    writeln!(file, "{}", headers)?;
    for (i, (t, x)) in result.trajectory.points.iter().enumerate() {
        let row = std::iter::once(*t)
            .chain(x.iter().copied())
            .chain(result.outputs.row(i).iter().copied())
            .join("\t");
        writeln!(file, "{}", row)?;
    }
    info!("result with {} rows saved to {}", result.trajectory.len(), filename);
    Ok(())
}

/// Same columns as [`save_result_to_file`], written as CSV.
pub fn save_result_to_csv(result: &SimulationResult, filename: &str) -> io::Result<()> {
    let mut writer = Writer::from_path(filename)?;
    let headers: Vec<&str> = std::iter::once("time")
        .chain(result.trajectory.state_names.iter().map(String::as_str))
        .chain(result.output_names.iter().map(String::as_str))
        .collect();
    writer.write_record(&headers)?;
    for (i, (t, x)) in result.trajectory.points.iter().enumerate() {
        let row: Vec<String> = std::iter::once(*t)
            .chain(x.iter().copied())
            .chain(result.outputs.row(i).iter().copied())
            .map(|v| v.to_string())
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    info!("result with {} rows saved to {}", result.trajectory.len(), filename);
    Ok(())
}
