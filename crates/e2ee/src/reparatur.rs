//! Reparatur nach degradiertem Betrieb
//!
//! War der Schluessel-Speicher nicht erreichbar, wurden Nachrichten mit dem
//! abgeleiteten Fallback-Schluessel verschluesselt. Sobald der Speicher wieder
//! antwortet, ersetzt dieser Task die degradierten Cache-Eintraege durch den
//! kanonischen Schluessel und verschluesselt die betroffenen Nachrichten neu.
//!
//! Der Task laeuft periodisch via `starten()`, `durchlauf()` kann aber auch
//! direkt aufgerufen werden.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use huddle_core::{EntityId, Uhr};
use huddle_crypto::e2e::{decrypt_message, encrypt_message, GroupKeyManager};
use huddle_crypto::store::{MessageStore, StoredMessage};
use huddle_crypto::{CryptoError, EncryptionVersion, Envelope, GroupKey};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ReparaturEinstellungen;
use crate::error::{E2eeError, E2eeResult};

/// Ergebnis eines Reparatur-Durchlaufs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparaturBericht {
    pub zeitpunkt: DateTime<Utc>,
    /// Degradierte Cache-Eintraege, die ersetzt bzw. verworfen wurden
    pub cache_bereinigt: usize,
    /// Neu verschluesselte Nachrichten
    pub repariert: usize,
    /// Zwischenzeitlich von anderer Stelle geaendert
    pub uebersprungen: usize,
    pub fehlgeschlagen: usize,
    /// `false` wenn der Speicher weiterhin nicht erreichbar war
    pub speicher_erreichbar: bool,
}

impl ReparaturBericht {
    fn neu(zeitpunkt: DateTime<Utc>) -> Self {
        Self {
            zeitpunkt,
            cache_bereinigt: 0,
            repariert: 0,
            uebersprungen: 0,
            fehlgeschlagen: 0,
            speicher_erreichbar: true,
        }
    }
}

/// Periodischer Reparatur-Task
pub struct ReparaturTask {
    manager: Arc<GroupKeyManager>,
    nachrichten: Arc<dyn MessageStore>,
    uhr: Arc<dyn Uhr>,
    intervall: Duration,
    batch_groesse: u32,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    letzter_bericht: Mutex<Option<ReparaturBericht>>,
}

impl ReparaturTask {
    pub fn neu(
        manager: Arc<GroupKeyManager>,
        nachrichten: Arc<dyn MessageStore>,
        uhr: Arc<dyn Uhr>,
        einstellungen: &ReparaturEinstellungen,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            manager,
            nachrichten,
            uhr,
            intervall: einstellungen.intervall(),
            batch_groesse: einstellungen.batch_groesse.max(1),
            shutdown,
            handle: Mutex::new(None),
            letzter_bericht: Mutex::new(None),
        })
    }

    /// Bericht des letzten abgeschlossenen Durchlaufs
    pub fn letzter_bericht(&self) -> Option<ReparaturBericht> {
        self.letzter_bericht.lock().clone()
    }

    pub fn laeuft(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Startet den periodischen Task (erster Durchlauf sofort)
    ///
    /// Gibt `false` zurueck wenn der Task bereits laeuft.
    pub fn starten(self: &Arc<Self>) -> bool {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        self.shutdown.send_replace(false);
        let mut shutdown_rx = self.shutdown.subscribe();
        let task = Arc::clone(self);

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(task.intervall);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(intervall_s = task.intervall.as_secs(), "Reparatur-Task gestartet");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = task.durchlauf().await {
                            warn!(fehler = %e, "Reparatur-Durchlauf fehlgeschlagen");
                        }
                    }
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Reparatur-Task wird beendet");
                            break;
                        }
                    }
                }
            }
        }));
        true
    }

    /// Signalisiert das Ende und wartet, bis ein laufender Durchlauf fertig ist
    pub async fn stoppen(&self) {
        self.shutdown.send_replace(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(fehler = %e, "Reparatur-Task endete fehlerhaft");
            }
        }
    }

    /// Ein vollstaendiger Reparatur-Durchlauf
    pub async fn durchlauf(&self) -> E2eeResult<ReparaturBericht> {
        let mut bericht = ReparaturBericht::neu(self.uhr.jetzt());

        if self.cache_bereinigen(&mut bericht).await {
            self.nachrichten_reparieren(&mut bericht).await?;
        }

        if bericht.repariert > 0 || bericht.cache_bereinigt > 0 || bericht.fehlgeschlagen > 0 {
            info!(
                cache_bereinigt = bericht.cache_bereinigt,
                repariert = bericht.repariert,
                uebersprungen = bericht.uebersprungen,
                fehlgeschlagen = bericht.fehlgeschlagen,
                "Reparatur-Durchlauf abgeschlossen"
            );
        } else if !bericht.speicher_erreichbar {
            debug!("Schluessel-Speicher weiterhin nicht erreichbar");
        }

        *self.letzter_bericht.lock() = Some(bericht.clone());
        Ok(bericht)
    }

    /// Ersetzt degradierte Cache-Eintraege; `false` wenn der Speicher fehlt
    async fn cache_bereinigen(&self, bericht: &mut ReparaturBericht) -> bool {
        for entity in self.manager.degraded_entities() {
            match self.manager.existing_key(entity).await {
                Ok(_) => bericht.cache_bereinigt += 1,
                Err(e) if e.ist_kein_schluessel() => {
                    // Noch kein Record: der naechste Zugriff erstellt den kanonischen Schluessel
                    self.manager.invalidate(&entity);
                    bericht.cache_bereinigt += 1;
                }
                Err(CryptoError::Speicher(msg)) => {
                    debug!(entity = %entity, fehler = %msg, "Degradierter Eintrag bleibt");
                    bericht.speicher_erreichbar = false;
                    return false;
                }
                Err(e) => {
                    warn!(entity = %entity, fehler = %e, "Kanonischer Schluessel nicht lesbar");
                    bericht.fehlgeschlagen += 1;
                }
            }
        }
        true
    }

    /// Geht alle `Abgeleitet`-Nachrichten seitenweise durch
    ///
    /// Der Cursor laeuft auch ueber fehlgeschlagene Nachrichten hinweg, sodass
    /// dauerhaft defekte Eintraege die dahinter liegenden nicht blockieren.
    async fn nachrichten_reparieren(&self, bericht: &mut ReparaturBericht) -> E2eeResult<()> {
        let mut cursor = None;
        loop {
            let seite = match self
                .nachrichten
                .messages_with_version(EncryptionVersion::Abgeleitet, cursor, self.batch_groesse)
                .await
            {
                Ok(n) => n,
                Err(CryptoError::Speicher(msg)) => {
                    debug!(fehler = %msg, "Nachrichten-Speicher nicht erreichbar");
                    bericht.speicher_erreichbar = false;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            let Some(letzte) = seite.last() else {
                return Ok(());
            };
            cursor = Some(letzte.cursor());

            for nachricht in &seite {
                match self.nachricht_reparieren(nachricht).await {
                    Ok(true) => bericht.repariert += 1,
                    Ok(false) => bericht.uebersprungen += 1,
                    Err(E2eeError::Krypto(CryptoError::Speicher(msg))) => {
                        debug!(fehler = %msg, "Speicher waehrend der Reparatur ausgefallen");
                        bericht.speicher_erreichbar = false;
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(
                            nachricht = %nachricht.id,
                            entity = %nachricht.entity,
                            fehler = %e,
                            "Nachricht konnte nicht repariert werden"
                        );
                        bericht.fehlgeschlagen += 1;
                    }
                }
            }

            if seite.len() < self.batch_groesse as usize {
                return Ok(());
            }
        }
    }

    async fn nachricht_reparieren(&self, nachricht: &StoredMessage) -> E2eeResult<bool> {
        let payload = match nachricht.envelope.payload()? {
            Some(p) if nachricht.envelope.version() == Some(EncryptionVersion::Abgeleitet) => p,
            _ => return Ok(false),
        };

        let alt = self.manager.fallback_key(nachricht.entity)?;
        let klartext = decrypt_message(&payload, &alt)?;

        let kanonisch = self.kanonischer_schluessel(nachricht.entity).await?;
        let neu_payload = encrypt_message(&klartext, &kanonisch)?;
        let neu = Envelope::aus_payload(&neu_payload, kanonisch.version());

        Ok(self
            .nachrichten
            .replace_if_envelope(nachricht.id, &nachricht.envelope, &neu)
            .await?)
    }

    async fn kanonischer_schluessel(
        &self,
        entity: EntityId,
    ) -> E2eeResult<Arc<GroupKey>> {
        let key = self.manager.get_or_create_key(entity).await?;
        if key.ist_abgeleitet() {
            return Err(CryptoError::speicher(format!(
                "kein kanonischer Schluessel fuer {entity} verfuegbar"
            ))
            .into());
        }
        Ok(key)
    }
}

impl std::fmt::Debug for ReparaturTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReparaturTask")
            .field("intervall", &self.intervall)
            .field("batch_groesse", &self.batch_groesse)
            .field("laeuft", &self.laeuft())
            .finish()
    }
}
