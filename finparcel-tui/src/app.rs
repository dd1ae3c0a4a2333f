use chrono::{DateTime, Local};
use finparcel_core::{CarrierMeta, Parcel, RunOutcome};

use crate::config::{AppConfig, Translations};

/// What the parcel panel currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Panel {
    /// No run has finished yet.
    Loading,
    /// The last run failed.
    Failed(String),
    /// The last successful run, possibly empty.
    Parcels(Vec<Parcel>),
}

pub(crate) struct App {
    pub carriers: Vec<(CarrierMeta, bool)>,
    pub panel: Panel,
    pub last_updated: Option<DateTime<Local>>,
    pub is_refreshing: bool,
    pub scroll: usize,

    pub show_from_to: bool,
    pub translations: Translations,
}

impl App {
    pub(crate) fn new(config: &AppConfig, carriers: Vec<CarrierMeta>) -> Self {
        let run_config = config.run_config();
        let carriers = carriers
            .into_iter()
            .map(|meta| {
                let enabled = run_config.enabled_credentials(&meta.id).is_some();
                (meta, enabled)
            })
            .collect();

        Self {
            carriers,
            panel: Panel::Loading,
            last_updated: None,
            is_refreshing: false,
            scroll: 0,
            show_from_to: config.show_from_to,
            translations: config.translations.clone(),
        }
    }

    /// Apply a finished run; returns whether the shown content changed.
    pub(crate) fn apply(&mut self, outcome: RunOutcome) -> bool {
        let next = match outcome {
            RunOutcome::Skipped => return false,
            RunOutcome::Completed(parcels) => {
                self.last_updated = Some(Local::now());
                Panel::Parcels(parcels)
            }
            RunOutcome::Failed(err) => Panel::Failed(err.to_string()),
        };

        if next == self.panel {
            return false;
        }

        self.panel = next;
        self.scroll = 0;
        true
    }

    pub(crate) fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub(crate) fn scroll_down(&mut self) {
        if let Panel::Parcels(parcels) = &self.panel
            && self.scroll + 1 < parcels.len()
        {
            self.scroll += 1;
        }
    }
}
