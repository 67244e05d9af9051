//! E2EE-Konfiguration
//!
//! Wird aus einer TOML-Datei geladen. Alle Felder haben sinnvolle
//! Standardwerte, sodass das Subsystem ohne Konfigurationsdatei lauffaehig
//! ist. Geheimnisse (Master-Key, Fallback-Geheimnis) stehen nie in der Datei,
//! sondern in Umgebungsvariablen, deren Namen hier konfiguriert werden.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use huddle_crypto::{GroupKeyAlgorithm, RecordSchutz, SecretBytes};
use huddle_db::DatabaseConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige E2EE-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eeConfig {
    pub krypto: KryptoEinstellungen,
    pub fallback: FallbackEinstellungen,
    pub reparatur: ReparaturEinstellungen,
    pub datenbank: DatabaseConfig,
    pub logging: LoggingEinstellungen,
}

/// Wie Entity-Schluessel im Speicher abgelegt werden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchutzModus {
    /// Unter dem Master-Key eingewickelt
    MasterKey,
    /// Roh, der Speicher selbst ist vertrauenswuerdig
    Vertrauenswuerdig,
}

/// Krypto-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KryptoEinstellungen {
    /// Algorithmus fuer neu erzeugte Entity-Schluessel
    pub algorithmus: GroupKeyAlgorithm,
    pub record_schutz: SchutzModus,
    /// Umgebungsvariable mit dem Master-Key (Base64, 32 Bytes)
    pub master_key_env: String,
}

impl Default for KryptoEinstellungen {
    fn default() -> Self {
        Self {
            algorithmus: GroupKeyAlgorithm::Aes256Gcm,
            record_schutz: SchutzModus::MasterKey,
            master_key_env: "HD_MASTER_KEY".into(),
        }
    }
}

/// Degradierter Modus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackEinstellungen {
    pub aktiviert: bool,
    /// Umgebungsvariable mit dem Backend-Geheimnis fuer die Ableitung
    pub geheimnis_env: String,
}

impl Default for FallbackEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            geheimnis_env: "HD_FALLBACK_SECRET".into(),
        }
    }
}

/// Reparatur-Task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReparaturEinstellungen {
    pub aktiviert: bool,
    pub intervall_sekunden: u64,
    /// Seitengroesse beim Durchsuchen der degradierten Nachrichten
    pub batch_groesse: u32,
}

impl Default for ReparaturEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            intervall_sekunden: 300,
            batch_groesse: 100,
        }
    }
}

impl ReparaturEinstellungen {
    pub fn intervall(&self) -> Duration {
        Duration::from_secs(self.intervall_sekunden.max(1))
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl E2eeConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// Fehlt die Datei, werden Standardwerte verwendet.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !huddle_observability::log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiges Log-Level '{}'", self.logging.level);
        }
        if !huddle_observability::log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        if self.reparatur.batch_groesse == 0 {
            anyhow::bail!("reparatur.batch_groesse muss groesser als 0 sein");
        }
        if self.datenbank.max_verbindungen == 0 {
            anyhow::bail!("datenbank.max_verbindungen muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Baut den Record-Schutz; liest dafuer ggf. den Master-Key aus der Umgebung
    pub fn record_schutz(&self) -> anyhow::Result<RecordSchutz> {
        match self.krypto.record_schutz {
            SchutzModus::Vertrauenswuerdig => Ok(RecordSchutz::Vertrauenswuerdig),
            SchutzModus::MasterKey => {
                let name = &self.krypto.master_key_env;
                let wert = std::env::var(name)
                    .map_err(|_| anyhow::anyhow!("Umgebungsvariable '{name}' nicht gesetzt"))?;
                let bytes = STANDARD
                    .decode(wert.trim())
                    .map_err(|e| anyhow::anyhow!("'{name}' ist kein gueltiges Base64: {e}"))?;
                if bytes.len() != 32 {
                    anyhow::bail!("'{name}' muss 32 Bytes enthalten, hat {}", bytes.len());
                }
                Ok(RecordSchutz::MasterKey(SecretBytes::new(bytes)))
            }
        }
    }

    /// Fallback-Geheimnis, falls der degradierte Modus aktiviert ist
    pub fn fallback_geheimnis(&self) -> anyhow::Result<Option<SecretBytes>> {
        if !self.fallback.aktiviert {
            return Ok(None);
        }
        let name = &self.fallback.geheimnis_env;
        let wert = std::env::var(name)
            .map_err(|_| anyhow::anyhow!("Umgebungsvariable '{name}' nicht gesetzt"))?;
        if wert.is_empty() {
            anyhow::bail!("'{name}' ist leer");
        }
        Ok(Some(SecretBytes::new(wert.into_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = E2eeConfig::default();
        assert_eq!(cfg.krypto.algorithmus, GroupKeyAlgorithm::Aes256Gcm);
        assert_eq!(cfg.krypto.record_schutz, SchutzModus::MasterKey);
        assert!(!cfg.fallback.aktiviert);
        assert_eq!(cfg.reparatur.intervall(), Duration::from_secs(300));
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn validierung_erkennt_fehler() {
        let mut cfg = E2eeConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = E2eeConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = E2eeConfig::default();
        cfg.reparatur.batch_groesse = 0;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
[krypto]
algorithmus = "chacha20poly1305"
record_schutz = "vertrauenswuerdig"

[fallback]
aktiviert = true

[reparatur]
intervall_sekunden = 30

[datenbank]
url = "sqlite://test.db"
"#;
        let cfg: E2eeConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.krypto.algorithmus, GroupKeyAlgorithm::ChaCha20Poly1305);
        assert_eq!(cfg.krypto.record_schutz, SchutzModus::Vertrauenswuerdig);
        assert!(cfg.fallback.aktiviert);
        assert_eq!(cfg.fallback.geheimnis_env, "HD_FALLBACK_SECRET");
        assert_eq!(cfg.reparatur.intervall_sekunden, 30);
        assert_eq!(cfg.reparatur.batch_groesse, 100);
        assert_eq!(cfg.datenbank.url, "sqlite://test.db");
        assert_eq!(cfg.datenbank.max_verbindungen, 5);
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = E2eeConfig::laden("/nicht/vorhanden/huddle.toml").unwrap();
        assert_eq!(cfg.reparatur.batch_groesse, 100);
    }

    #[test]
    fn kaputte_datei_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("huddle.toml");
        std::fs::write(&pfad, "[krypto\nalgorithmus = 1").unwrap();
        assert!(E2eeConfig::laden(pfad.to_str().unwrap()).is_err());
    }

    #[test]
    fn master_key_aus_umgebung() {
        let mut cfg = E2eeConfig::default();
        cfg.krypto.master_key_env = "HD_TEST_MASTER_KEY_CONFIG".into();

        std::env::remove_var("HD_TEST_MASTER_KEY_CONFIG");
        assert!(cfg.record_schutz().is_err());

        std::env::set_var("HD_TEST_MASTER_KEY_CONFIG", STANDARD.encode([7u8; 16]));
        assert!(cfg.record_schutz().is_err());

        std::env::set_var("HD_TEST_MASTER_KEY_CONFIG", STANDARD.encode([7u8; 32]));
        assert!(matches!(cfg.record_schutz().unwrap(), RecordSchutz::MasterKey(_)));
        std::env::remove_var("HD_TEST_MASTER_KEY_CONFIG");

        cfg.krypto.record_schutz = SchutzModus::Vertrauenswuerdig;
        assert!(matches!(cfg.record_schutz().unwrap(), RecordSchutz::Vertrauenswuerdig));
    }

    #[test]
    fn fallback_geheimnis_nur_wenn_aktiviert() {
        let mut cfg = E2eeConfig::default();
        cfg.fallback.geheimnis_env = "HD_TEST_FALLBACK_CONFIG".into();
        std::env::set_var("HD_TEST_FALLBACK_CONFIG", "backend-geheimnis");

        assert!(cfg.fallback_geheimnis().unwrap().is_none());
        cfg.fallback.aktiviert = true;
        assert_eq!(
            cfg.fallback_geheimnis().unwrap().unwrap().as_bytes(),
            b"backend-geheimnis"
        );
        std::env::remove_var("HD_TEST_FALLBACK_CONFIG");
    }
}
