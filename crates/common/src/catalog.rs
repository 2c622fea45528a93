//! Scenario catalog
//!
//! Read-only reference data mapping a scenario id to its target application
//! and the literal titles of its tests.

use crate::error::{Error, Result};
use crate::types::Scenario;
use serde::Deserialize;
use std::path::Path;

/// Immutable list of known scenarios
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }

    /// Load `[[scenarios]]` tables from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        if file.scenarios.is_empty() {
            return Err(Error::InvalidConfig("catalog defines no scenarios".to_string()));
        }
        Ok(Self::new(file.scenarios))
    }

    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Look up a scenario, failing with `UnknownScenario`
    pub fn require(&self, id: &str) -> Result<&Scenario> {
        self.get(id).ok_or_else(|| Error::UnknownScenario(id.to_string()))
    }

    pub fn all(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// The eight login scenarios shipped with the mock applications
    pub fn builtin() -> Self {
        fn scenario(id: &str, kind: &str, title: &str, url: &str, tests: &[&str]) -> Scenario {
            Scenario {
                id: id.to_string(),
                kind: kind.to_string(),
                title: title.to_string(),
                target_base_url: url.to_string(),
                tests: tests.iter().map(|t| t.to_string()).collect(),
            }
        }

        Self::new(vec![
            scenario(
                "s-basic-0001",
                "basic-login",
                "Basic login - validation + invalid creds + happy path",
                "http://mock-app-basic:51010",
                &[
                    "Basic - invalid credentials shows error",
                    "Basic - empty fields show validation",
                    "Basic - valid credentials logs in",
                ],
            ),
            scenario(
                "s-csrf-0001",
                "csrf-login",
                "CSRF login - requires token",
                "http://mock-app-csrf:51011",
                &[
                    "CSRF - missing token is rejected",
                    "CSRF - invalid token is rejected",
                    "CSRF - valid token allows login",
                ],
            ),
            scenario(
                "s-mfa-0001",
                "mfa-login",
                "MFA login - step 1 then OTP",
                "http://mock-app-mfa:51012",
                &[
                    "MFA - valid credentials then valid OTP succeeds",
                    "MFA - invalid OTP fails",
                    "MFA - expired OTP fails",
                ],
            ),
            scenario(
                "s-lockout-0001",
                "lockout-login",
                "Lockout login - locked after 3 failures",
                "http://mock-app-lockout:51013",
                &[
                    "Lockout - locks user after 3 failures",
                    "Lockout - locked user cannot login with correct password",
                    "Lockout - user can login after lockout window",
                ],
            ),
            scenario(
                "s-session-fixation-0001",
                "session-fixation",
                "Session Fixation - prevent session fixation attacks",
                "http://mock-app-session-fixation:51014",
                &[
                    "Session Fixation - prevents session fixation",
                    "Session Fixation - generates new session ID after login",
                ],
            ),
            scenario(
                "s-password-policy-0001",
                "password-policy",
                "Password Policy - enforce strong passwords",
                "http://mock-app-password-policy:51015",
                &[
                    "Password Policy - rejects weak passwords",
                    "Password Policy - accepts strong passwords",
                    "Password Policy - enforces minimum length",
                ],
            ),
            scenario(
                "s-rate-limiting-0001",
                "rate-limiting",
                "Rate Limiting - prevent brute force attacks",
                "http://mock-app-rate-limiting:51016",
                &[
                    "Rate Limiting - blocks requests after threshold",
                    "Rate Limiting - allows requests within threshold",
                    "Rate Limiting - resets after timeout period",
                ],
            ),
            scenario(
                "s-account-enumeration-0001",
                "account-enumeration",
                "Account Enumeration - prevent username guessing",
                "http://mock-app-account-enumeration:51017",
                &[
                    "Account Enumeration - consistent error messages",
                    "Account Enumeration - prevents timing attacks",
                    "Account Enumeration - masks account existence",
                ],
            ),
        ])
    }
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
