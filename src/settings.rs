// ============================================================================
// EDITOR SETTINGS: key=value file in the platform config directory
// ============================================================================

use std::path::{Path, PathBuf};

use crate::components::history::DEFAULT_MAX_STEPS;

const SETTINGS_FILE: &str = "paintfe_core_settings.cfg";

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub max_undo_steps: usize,
    /// History memory cap in megabytes; 0 disables the cap.
    pub max_history_mb: usize,
    pub brush_size: f32,
    pub brush_hardness: f32,
    /// Dab spacing as a fraction of the brush diameter.
    pub brush_spacing: f32,
    /// Bucket fill tolerance, percent.
    pub fill_tolerance: f32,
    pub handle_radius: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: DEFAULT_MAX_STEPS,
            max_history_mb: 100,
            brush_size: 10.0,
            brush_hardness: 0.75,
            brush_spacing: 0.25,
            fill_tolerance: 5.0,
            handle_radius: 6.0,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/paintfe/paintfe_core_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PaintFE\paintfe_core_settings.cfg
    /// On macOS:   ~/Library/Application Support/PaintFE/paintfe_core_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("paintfe");
            Some(config_dir.join(SETTINGS_FILE))
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            Some(PathBuf::from(appdata).join("PaintFE").join(SETTINGS_FILE))
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("PaintFE")
                    .join(SETTINGS_FILE),
            )
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// History memory cap in bytes, `None` when disabled.
    pub fn history_memory_bytes(&self) -> Option<usize> {
        (self.max_history_mb > 0).then(|| self.max_history_mb.saturating_mul(1024 * 1024))
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo_steps={}\n\
             max_history_mb={}\n\
             brush_size={}\n\
             brush_hardness={}\n\
             brush_spacing={}\n\
             fill_tolerance={}\n\
             handle_radius={}\n",
            self.max_undo_steps,
            self.max_history_mb,
            self.brush_size,
            self.brush_hardness,
            self.brush_spacing,
            self.fill_tolerance,
            self.handle_radius,
        )
    }

    /// Parse `key=value` lines. Unknown keys and unparsable or out-of-range
    /// values keep their defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_undo_steps" => {
                    if let Ok(v) = val.parse::<usize>()
                        && v > 0
                    {
                        s.max_undo_steps = v;
                    }
                }
                "max_history_mb" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.max_history_mb = v;
                    }
                }
                "brush_size" => {
                    if let Some(v) = parse_finite(val)
                        && v > 0.0
                    {
                        s.brush_size = v;
                    }
                }
                "brush_hardness" => {
                    if let Some(v) = parse_finite(val) {
                        s.brush_hardness = v.clamp(0.0, 1.0);
                    }
                }
                "brush_spacing" => {
                    if let Some(v) = parse_finite(val)
                        && v > 0.0
                    {
                        s.brush_spacing = v.min(2.0);
                    }
                }
                "fill_tolerance" => {
                    if let Some(v) = parse_finite(val) {
                        s.fill_tolerance = v.clamp(0.0, 100.0);
                    }
                }
                "handle_radius" => {
                    if let Some(v) = parse_finite(val)
                        && v > 0.0
                    {
                        s.handle_radius = v;
                    }
                }
                _ => {}
            }
        }
        s
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::settings_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let result = std::fs::write(path, self.to_config_string());
        if let Err(e) = &result {
            log_err!("Failed to save settings to {}: {}", path.display(), e);
        }
        result
    }
}

/// NaN and infinities count as unparsable.
fn parse_finite(val: &str) -> Option<f32> {
    val.parse::<f32>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_string_round_trips() {
        let mut s = EditorSettings::default();
        s.max_undo_steps = 12;
        s.brush_hardness = 0.5;
        s.fill_tolerance = 30.0;
        assert_eq!(EditorSettings::from_config_str(&s.to_config_string()), s);
    }

    #[test]
    fn bad_values_fall_back() {
        let s = EditorSettings::from_config_str(
            "max_undo_steps=0\nbrush_size=abc\nbrush_hardness=7\nfill_tolerance=-3\nmystery=1\nnot a line\n",
        );
        assert_eq!(s.max_undo_steps, DEFAULT_MAX_STEPS);
        assert_eq!(s.brush_size, 10.0);
        assert_eq!(s.brush_hardness, 1.0);
        assert_eq!(s.fill_tolerance, 0.0);
    }

    #[test]
    fn zero_megabytes_disables_cap() {
        let mut s = EditorSettings::default();
        assert_eq!(s.history_memory_bytes(), Some(100 * 1024 * 1024));
        s.max_history_mb = 0;
        assert_eq!(s.history_memory_bytes(), None);
    }

    #[test]
    fn huge_megabytes_saturate() {
        let s = EditorSettings::from_config_str(&format!("max_history_mb={}", usize::MAX));
        assert_eq!(s.max_history_mb, usize::MAX);
        assert_eq!(s.history_memory_bytes(), Some(usize::MAX));
    }

    #[test]
    fn non_finite_floats_keep_defaults() {
        let defaults = EditorSettings::default();
        let s = EditorSettings::from_config_str(
            "brush_hardness=NaN\nbrush_size=inf\nbrush_spacing=NaN\nfill_tolerance=-inf\nhandle_radius=inf\n",
        );
        assert_eq!(s.brush_hardness, defaults.brush_hardness);
        assert_eq!(s.brush_size, defaults.brush_size);
        assert_eq!(s.brush_spacing, defaults.brush_spacing);
        assert_eq!(s.fill_tolerance, defaults.fill_tolerance);
        assert_eq!(s.handle_radius, defaults.handle_radius);
        assert_eq!(s, defaults);
    }
}
