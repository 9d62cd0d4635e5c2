use std::io::Write;

/// Installs the global logger. `RUST_LOG` overrides the `info` default.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{:<5} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}

/// Logger for tests; output is captured by the harness.
pub fn init_test() {
    let _ = env_logger::builder().is_test(true).try_init();
}
