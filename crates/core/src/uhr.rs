//! Injizierbare Uhr
//!
//! Zeitstempel (Rotation, Erstellung, Reparatur-Durchlaeufe) werden ueber
//! das `Uhr`-Trait bezogen, damit Tests die Zeit kontrollieren koennen.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Quelle fuer die aktuelle Zeit
pub trait Uhr: Send + Sync + 'static {
    fn jetzt(&self) -> DateTime<Utc>;
}

/// Systemuhr (Standard im Betrieb)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUhr;

impl Uhr for SystemUhr {
    fn jetzt(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manuell gestellte Uhr fuer Tests
#[derive(Debug, Clone)]
pub struct FesteUhr {
    zeit: Arc<Mutex<DateTime<Utc>>>,
}

impl FesteUhr {
    pub fn neu(start: DateTime<Utc>) -> Self {
        Self {
            zeit: Arc::new(Mutex::new(start)),
        }
    }

    /// Stellt die Uhr um die angegebene Dauer vor
    pub fn vorstellen(&self, dauer: Duration) {
        let mut zeit = self.zeit.lock();
        *zeit += dauer;
    }
}

impl Uhr for FesteUhr {
    fn jetzt(&self) -> DateTime<Utc> {
        *self.zeit.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feste_uhr_vorstellen() {
        let start = Utc::now();
        let uhr = FesteUhr::neu(start);
        assert_eq!(uhr.jetzt(), start);

        uhr.vorstellen(Duration::seconds(90));
        assert_eq!(uhr.jetzt(), start + Duration::seconds(90));
    }

    #[test]
    fn klone_teilen_die_zeit() {
        let uhr = FesteUhr::neu(Utc::now());
        let klon = uhr.clone();
        uhr.vorstellen(Duration::minutes(5));
        assert_eq!(uhr.jetzt(), klon.jetzt());
    }
}
