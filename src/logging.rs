use log::LevelFilter;

/// Sends log records to stderr. Each `verbosity` step lowers the level by one.
pub fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // Protocol crates are chatty at debug level
        .level_for("async_imap", LevelFilter::Info)
        .level_for("lettre", LevelFilter::Info)
        .chain(std::io::stderr())
        .apply()
}
