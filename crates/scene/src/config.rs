use serde::{Deserialize, Serialize};
use trellis_render::ClearConfig;

/// Scene-wide settings, loadable from JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    /// Framebuffer planes cleared at the start of every frame.
    pub clear: ClearConfig,
    /// Keep `WillUpdate`/`DidUpdate` transform notifications for draining.
    pub record_transform_events: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config: SceneConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SceneConfig::default());
        assert_eq!(config.clear.depth, Some(1.0));
        assert!(!config.record_transform_events);
    }

    #[test]
    fn partial_clear_override() {
        let config: SceneConfig =
            serde_json::from_str(r#"{"clear": {"color": [0.2, 0.2, 0.2, 1.0], "depth": null}}"#)
                .unwrap();
        assert_eq!(config.clear.color, Some([0.2, 0.2, 0.2, 1.0]));
        assert_eq!(config.clear.depth, None);
        assert_eq!(config.clear.stencil, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_json::from_str::<SceneConfig>(r#"{"clearColor": [0, 0, 0, 1]}"#);
        assert!(err.is_err());
    }
}
