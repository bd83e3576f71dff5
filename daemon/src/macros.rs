//! Custom macros for reducing code repetition in clipchain

/// Log an error and continue execution (non-fatal error handling)
///
/// # Example
/// ```ignore
/// log_and_continue!(surface.play(), "resume standby surface");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::error!("Failed to {}: {}", $context, e);
        }
    };
}

/// Validate an enum-like string value
///
/// # Example
/// ```ignore
/// validate_enum!(level, "trace", "debug", "info", "warn", "error");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok(()),
            _ => anyhow::bail!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", ")),
        }
    };
}

/// Swap the red and blue channels of a packed 4-byte pixel buffer in place
/// (RGBA <-> BGRA)
///
/// # Example
/// ```ignore
/// swap_red_blue!(&mut pixels);
/// ```
#[macro_export]
macro_rules! swap_red_blue {
    ($pixels:expr) => {
        for pixel in $pixels.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
    };
}
