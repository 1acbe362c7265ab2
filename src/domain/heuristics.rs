//! Keyword and context heuristics for uninstall/disable attempts.
//!
//! The rules are data: every package list, phrase and class marker lives in
//! [`KeywordRules`], which deserializes from configuration. [`SurfaceMatcher`]
//! is the compiled, lowercase form used on the hot path.
//!
//! Matching is scoped by surface to keep false positives down:
//! - launcher: an explicit uninstall/remove/app-info phrase plus a target name
//! - installer: the bare presence of a target name
//! - settings: a settings phrase, a relevant screen class and a target name
//! - store: an uninstall phrase plus a target name

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Monitored system surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Settings,
    Installer,
    Launcher,
    Store,
}

/// Heuristic tables, all matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordRules {
    pub settings_packages: Vec<String>,
    pub installer_packages: Vec<String>,
    pub launcher_packages: Vec<String>,
    pub store_packages: Vec<String>,
    /// Class-name fragments of credential, biometric and lock prompts.
    pub auth_class_markers: Vec<String>,
    /// Class-name fragments of editable fields; their text is never inspected.
    pub text_input_class_markers: Vec<String>,
    pub launcher_phrases: Vec<String>,
    pub settings_phrases: Vec<String>,
    pub settings_class_markers: Vec<String>,
    pub store_phrases: Vec<String>,
    /// Target names shorter than this are ignored to avoid matching noise.
    pub min_target_len: usize,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self {
            settings_packages: strings(&[
                "com.android.settings",
                "com.samsung.android.settings",
                "com.miui.securitycenter",
                "com.coloros.safecenter",
            ]),
            installer_packages: strings(&[
                "com.android.packageinstaller",
                "com.google.android.packageinstaller",
                "com.miui.packageinstaller",
                "com.samsung.android.packageinstaller",
            ]),
            launcher_packages: strings(&[
                "com.android.launcher3",
                "com.google.android.apps.nexuslauncher",
                "com.sec.android.app.launcher",
                "com.miui.home",
                "com.oppo.launcher",
            ]),
            store_packages: strings(&["com.android.vending"]),
            auth_class_markers: strings(&[
                "keyguard",
                "biometric",
                "fingerprint",
                "credential",
                "confirmlock",
                "chooselock",
                "lockscreen",
                "passwordentry",
            ]),
            text_input_class_markers: strings(&["edittext", "searchview", "autocomplete"]),
            launcher_phrases: strings(&["uninstall", "remove", "app info"]),
            settings_phrases: strings(&[
                "uninstall",
                "force stop",
                "disable",
                "deactivate",
                "clear storage",
                "clear data",
                "device admin",
                "turn off",
            ]),
            settings_class_markers: strings(&[
                "installedappdetails",
                "appinfo",
                "subsettings",
                "deviceadmin",
                "alertdialog",
                "accessibility",
                "settingsactivity",
            ]),
            store_phrases: strings(&["uninstall"]),
            min_target_len: 3,
        }
    }
}

/// A heuristic hit: which surface matched and which protected target was named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptMatch {
    pub surface: Surface,
    pub target: String,
}

/// Compiled, lowercase form of [`KeywordRules`].
#[derive(Debug, Clone)]
pub struct SurfaceMatcher {
    surfaces: AHashMap<String, Surface>,
    auth_class_markers: Vec<String>,
    text_input_class_markers: Vec<String>,
    launcher_phrases: Vec<String>,
    settings_phrases: Vec<String>,
    settings_class_markers: Vec<String>,
    store_phrases: Vec<String>,
    min_target_len: usize,
}

fn lowered(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

impl SurfaceMatcher {
    pub fn new(rules: &KeywordRules) -> Self {
        let mut surfaces = AHashMap::new();
        let groups = [
            (&rules.settings_packages, Surface::Settings),
            (&rules.installer_packages, Surface::Installer),
            (&rules.launcher_packages, Surface::Launcher),
            (&rules.store_packages, Surface::Store),
        ];
        for (packages, surface) in groups {
            for package in lowered(packages) {
                surfaces.insert(package, surface);
            }
        }

        Self {
            surfaces,
            auth_class_markers: lowered(&rules.auth_class_markers),
            text_input_class_markers: lowered(&rules.text_input_class_markers),
            launcher_phrases: lowered(&rules.launcher_phrases),
            settings_phrases: lowered(&rules.settings_phrases),
            settings_class_markers: lowered(&rules.settings_class_markers),
            store_phrases: lowered(&rules.store_phrases),
            min_target_len: rules.min_target_len,
        }
    }

    /// Monitored surface a package belongs to, if any.
    ///
    /// Package ids are case-sensitive on the host but the configured lists
    /// are matched case-insensitively.
    pub fn surface_of(&self, package: &str) -> Option<Surface> {
        if let Some(surface) = self.surfaces.get(package) {
            return Some(*surface);
        }
        if package.bytes().any(|b| b.is_ascii_uppercase()) {
            return self.surfaces.get(&package.to_ascii_lowercase()).copied();
        }
        None
    }

    /// Whether the class name belongs to a credential, biometric or lock prompt.
    pub fn is_auth_screen(&self, class_name: &str) -> bool {
        if class_name.is_empty() {
            return false;
        }
        let class_lower = class_name.to_lowercase();
        contains_any(&class_lower, &self.auth_class_markers)
    }

    /// Evaluate the surface-scoped rules against an event's class and text.
    ///
    /// `targets` are lowercase display names of everything currently protected.
    pub fn match_attempt(
        &self,
        surface: Surface,
        class_name: &str,
        text: &str,
        targets: &[String],
    ) -> Option<AttemptMatch> {
        if text.is_empty() || targets.is_empty() {
            return None;
        }

        let class_lower = class_name.to_lowercase();
        if contains_any(&class_lower, &self.text_input_class_markers) {
            return None;
        }

        let text_lower = text.to_lowercase();
        let target = targets
            .iter()
            .filter(|t| t.len() >= self.min_target_len)
            .find(|t| text_lower.contains(t.as_str()))?;

        let matched = match surface {
            Surface::Installer => true,
            Surface::Launcher => contains_any(&text_lower, &self.launcher_phrases),
            Surface::Store => contains_any(&text_lower, &self.store_phrases),
            Surface::Settings => {
                contains_any(&text_lower, &self.settings_phrases)
                    && contains_any(&class_lower, &self.settings_class_markers)
            }
        };

        matched.then(|| AttemptMatch {
            surface,
            target: target.clone(),
        })
    }
}

impl Default for SurfaceMatcher {
    fn default() -> Self {
        Self::new(&KeywordRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<String> {
        vec!["instagram".to_string()]
    }

    #[test]
    fn test_surface_lookup() {
        let matcher = SurfaceMatcher::default();
        assert_eq!(
            matcher.surface_of("com.android.settings"),
            Some(Surface::Settings)
        );
        assert_eq!(
            matcher.surface_of("com.google.android.packageinstaller"),
            Some(Surface::Installer)
        );
        assert_eq!(matcher.surface_of("com.miui.home"), Some(Surface::Launcher));
        assert_eq!(matcher.surface_of("com.android.vending"), Some(Surface::Store));
        assert_eq!(matcher.surface_of("com.example.notes"), None);
    }

    #[test]
    fn test_launcher_requires_explicit_phrase() {
        let matcher = SurfaceMatcher::default();
        assert!(matcher
            .match_attempt(Surface::Launcher, "android.widget.TextView", "Instagram", &targets())
            .is_none());

        let hit = matcher
            .match_attempt(
                Surface::Launcher,
                "android.widget.PopupWindow",
                "Instagram  App info  Uninstall",
                &targets(),
            )
            .unwrap();
        assert_eq!(hit.surface, Surface::Launcher);
        assert_eq!(hit.target, "instagram");
    }

    #[test]
    fn test_installer_reacts_to_bare_name() {
        let matcher = SurfaceMatcher::default();
        assert!(matcher
            .match_attempt(Surface::Installer, "android.app.Dialog", "Instagram", &targets())
            .is_some());
    }

    #[test]
    fn test_settings_needs_phrase_and_class() {
        let matcher = SurfaceMatcher::default();

        // Right phrase, unrelated screen class
        assert!(matcher
            .match_attempt(
                Surface::Settings,
                "android.widget.ListView",
                "Instagram force stop",
                &targets(),
            )
            .is_none());

        // Right class, no dangerous phrase
        assert!(matcher
            .match_attempt(
                Surface::Settings,
                "com.android.settings.applications.InstalledAppDetailsTop",
                "Instagram storage 120 MB",
                &targets(),
            )
            .is_none());

        assert!(matcher
            .match_attempt(
                Surface::Settings,
                "com.android.settings.applications.InstalledAppDetailsTop",
                "Instagram  FORCE STOP  Uninstall",
                &targets(),
            )
            .is_some());
    }

    #[test]
    fn test_search_box_text_is_ignored() {
        let matcher = SurfaceMatcher::default();
        assert!(matcher
            .match_attempt(
                Surface::Installer,
                "android.widget.EditText",
                "uninstall instagram",
                &targets(),
            )
            .is_none());
    }

    #[test]
    fn test_short_targets_ignored() {
        let matcher = SurfaceMatcher::default();
        let short = vec!["x".to_string()];
        assert!(matcher
            .match_attempt(Surface::Installer, "android.app.Dialog", "x marks", &short)
            .is_none());
    }

    #[test]
    fn test_auth_screen_detection() {
        let matcher = SurfaceMatcher::default();
        assert!(matcher.is_auth_screen("com.android.settings.password.ConfirmLockPattern"));
        assert!(matcher.is_auth_screen("android.hardware.biometrics.BiometricPrompt"));
        assert!(matcher.is_auth_screen("com.android.systemui.keyguard.KeyguardViewMediator"));
        assert!(!matcher.is_auth_screen("com.android.settings.SubSettings"));
        assert!(!matcher.is_auth_screen(""));
    }

    #[test]
    fn test_rules_deserialize_with_defaults() {
        let rules: KeywordRules =
            serde_json::from_str(r#"{"store_packages": ["org.fdroid.fdroid"]}"#).unwrap();
        assert_eq!(rules.store_packages, vec!["org.fdroid.fdroid".to_string()]);
        assert_eq!(rules.launcher_phrases, KeywordRules::default().launcher_phrases);

        let matcher = SurfaceMatcher::new(&rules);
        assert_eq!(matcher.surface_of("org.fdroid.fdroid"), Some(Surface::Store));
        assert_eq!(matcher.surface_of("com.android.vending"), None);
    }
}
