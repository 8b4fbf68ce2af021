use crate::error::CoreResult;

/// The one surface the core uses to make results visible. Implemented by
/// the host integration layer.
pub trait UiGateway: Send + Sync {
    fn set_title(&self, context: &str, title: &str);
    /// Diagnostic, fire-and-forget; never affects control flow.
    fn log(&self, message: &str);
    fn send_to_property_inspector(&self, context: &str, payload: serde_json::Value);
}

pub trait ClipboardSource: Send + Sync {
    fn read_text(&self) -> CoreResult<String>;
}
