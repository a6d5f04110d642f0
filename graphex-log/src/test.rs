#[doc(hidden)]
pub fn __init_test(module_path: &'static str) {
    let crate_name = module_path.split("::").next().unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(format!("{crate_name}=trace"))
        .with_test_writer()
        .try_init()
        .ok();
}

/// Initialize the logger for testing.
///
/// Events are written through `tracing-subscriber`'s test writer, so they
/// land in the capture buffer of the running test rather than on the real
/// stderr, and an env filter restricts them to the calling crate at trace
/// level.
///
/// # Example
///
/// ```
/// graphex_log::init_test!();
/// ```
#[macro_export]
macro_rules! init_test {
    () => {
        $crate::__init_test(::std::module_path!());
    };
}
