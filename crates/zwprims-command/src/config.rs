/// Controls registry decode behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    /// When true, unregistered commands return `CommandError::UnknownCommand`
    /// instead of surfacing as `Message::Unknown`.
    pub fail_on_unknown: bool,
    /// When true, bytes left after the last declared field are an error.
    /// Newer protocol revisions append fields, so this is off by default.
    pub strict_length: bool,
}
