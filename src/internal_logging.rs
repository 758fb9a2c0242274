#![allow(unused_macros)]
//! Internal diagnostics for the registry itself.
//!
//! These macros are for use inside this crate only. With the `internal-logs`
//! feature enabled (the default) they emit `tracing` events targeted at the
//! crate name; without it they compile to nothing. When running tests with
//! `--nocapture` they print to stdout, which helps when following the flow of
//! operations through a failing test.

/// Log a debug-level event about a registry operation.
///
/// # Fields:
/// - `name`: the operation or transition being logged.
/// - Additional optional key-value pairs can be passed as attributes.
#[macro_export]
macro_rules! registry_debug {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!("registry_debug: name={}\n", $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name; // Compiler will optimize this out as it's unused.
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("registry_debug: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+); // Compiler will optimize this out as it's unused.
        }
    };
}

/// Log a warning-level event about a registry operation.
///
/// # Fields:
/// - `name`: the operation or transition being logged.
/// - Additional optional key-value pairs can be passed as attributes.
#[macro_export]
macro_rules! registry_warn {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!("registry_warn: name={}\n", $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name; // Compiler will optimize this out as it's unused.
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("registry_warn: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+); // Compiler will optimize this out as it's unused.
        }
    };
}
