/// Configuration macros for zero-repetition config definitions
///
/// `config_struct!` defines a configuration structure with its defaults
/// embedded next to each field.

/// Define a configuration struct with embedded defaults
///
/// Generates:
/// - The struct with public fields
/// - A `Default` implementation using the listed values
/// - Serde support with `#[serde(default)]`, so every field may be omitted
///   from the TOML file
///
/// # Example
/// ```
/// xonora::config_struct! {
///     pub struct RetryConfig {
///         attempts: u32 = 3,
///         base_delay_ms: u64 = 1000,
///     }
/// }
///
/// let cfg = RetryConfig::default();
/// assert_eq!(cfg.attempts, 3);
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
