//! Tests fuer das E2EE-Crate
//!
//! Jedes Geraet hat seinen eigenen Schluessel-Speicher; Verzeichnis,
//! Postfach, Teilnehmerliste und Nachrichten teilen sich alle Geraete.

mod aufbau_tests;

use std::sync::Arc;

use chrono::Utc;
use huddle_core::{DeviceId, UserId};
use huddle_crypto::e2e::{GroupKeyManager, KeyExchange, RecordSchutz};
use huddle_crypto::store::{
    DeviceRecord, PublicKeyDirectory, SpeicherNachrichten, SpeicherPostfach,
    SpeicherSchluesselStore, SpeicherTeilnehmer, SpeicherVerzeichnis,
};
use huddle_crypto::{IdentityKeyPair, SecretBytes};

use crate::service::E2eeService;

pub(crate) const FALLBACK_GEHEIMNIS: &[u8] = b"backend-geheimnis-fuer-tests";

pub(crate) struct Umgebung {
    pub verzeichnis: Arc<SpeicherVerzeichnis>,
    pub postfach: Arc<SpeicherPostfach>,
    pub teilnehmer: Arc<SpeicherTeilnehmer>,
    pub nachrichten: Arc<SpeicherNachrichten>,
}

pub(crate) struct Geraet {
    pub user: UserId,
    pub device: DeviceId,
    pub store: Arc<SpeicherSchluesselStore>,
    pub service: Arc<E2eeService>,
}

impl Umgebung {
    pub fn neu() -> Self {
        Self {
            verzeichnis: Arc::new(SpeicherVerzeichnis::neu()),
            postfach: Arc::new(SpeicherPostfach::neu()),
            teilnehmer: Arc::new(SpeicherTeilnehmer::neu()),
            nachrichten: Arc::new(SpeicherNachrichten::neu()),
        }
    }

    pub async fn geraet(&self, user: UserId) -> Geraet {
        self.geraet_mit(user, None).await
    }

    pub async fn geraet_mit_fallback(&self, user: UserId) -> Geraet {
        self.geraet_mit(user, Some(SecretBytes::new(FALLBACK_GEHEIMNIS.to_vec())))
            .await
    }

    async fn geraet_mit(&self, user: UserId, fallback: Option<SecretBytes>) -> Geraet {
        let identitaet = IdentityKeyPair::generate();
        let device = DeviceId::new();
        self.verzeichnis
            .register_device(&DeviceRecord {
                user_id: user,
                device_id: device,
                public_key: identitaet.export_public(),
                created_at: Utc::now(),
                rotated_at: None,
            })
            .await
            .expect("Geraet registrieren fehlgeschlagen");

        let store = Arc::new(SpeicherSchluesselStore::neu());
        let mut manager = GroupKeyManager::new(store.clone(), RecordSchutz::Vertrauenswuerdig);
        if let Some(geheimnis) = fallback {
            manager = manager.with_fallback(geheimnis);
        }

        let exchange = Arc::new(KeyExchange::new(
            Arc::new(manager),
            self.verzeichnis.clone(),
            self.postfach.clone(),
            identitaet,
            device,
        ));
        let service = E2eeService::neu(exchange, self.teilnehmer.clone(), self.nachrichten.clone());

        Geraet {
            user,
            device,
            store,
            service,
        }
    }
}
