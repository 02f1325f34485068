use log::LevelFilter;

pub fn setup(is_debug: bool) -> Result<(), fern::InitError> {
    let level_filter = if is_debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%H:%M:%S%.3f]"),
                record.target(),
                record.level(),
                message
            ));
        })
        .level(level_filter)
        .level_for("wgpu_core", LevelFilter::Warn)
        .level_for("wgpu_hal", LevelFilter::Warn)
        .level_for("iced_wgpu", LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;

    Ok(())
}
