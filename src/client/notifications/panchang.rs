//! The slice of the daily Panchang the notification schedule is built from.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::preferences::EventKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotQuality {
    Good,
    Neutral,
    Bad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaughadiyaSlot {
    pub name: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub quality: SlotQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoraSlot {
    pub planet: String,
    pub start: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanchangDay {
    pub date: String,
    pub sunrise: DateTime<FixedOffset>,
    pub tithi: Named,
    pub nakshatra: Named,
    pub yoga: Named,
    pub rahu_kaal: Window,
    #[serde(default)]
    pub abhijit_muhurat: Option<Window>,
    #[serde(default)]
    pub chaughadiya: Vec<ChaughadiyaSlot>,
    #[serde(default)]
    pub hora: Vec<HoraSlot>,
    #[serde(default)]
    pub bhadra: Option<Window>,
    #[serde(default)]
    pub panchak: Option<Window>,
    #[serde(default)]
    pub disha_shool: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyEvent {
    pub kind: EventKind,
    pub at: DateTime<Utc>,
    pub detail: String,
}

impl PanchangDay {
    /// Every alertable moment of the day, unfiltered by preferences.
    #[must_use]
    pub fn events(&self) -> Vec<DailyEvent> {
        let sunrise = self.sunrise.with_timezone(&Utc);
        let mut events = Vec::new();
        let mut push = |kind, at: DateTime<FixedOffset>, detail: String| {
            events.push(DailyEvent {
                kind,
                at: at.with_timezone(&Utc),
                detail,
            });
        };

        push(
            EventKind::RahuKaalStart,
            self.rahu_kaal.start,
            format!("Until {}", self.rahu_kaal.end.format("%H:%M")),
        );
        push(
            EventKind::RahuKaalEnd,
            self.rahu_kaal.end,
            "Inauspicious period is over".to_string(),
        );

        if let Some(abhijit) = &self.abhijit_muhurat {
            push(
                EventKind::AbhijeetMuhurat,
                abhijit.start,
                format!(
                    "{} to {}",
                    abhijit.start.format("%H:%M"),
                    abhijit.end.format("%H:%M")
                ),
            );
        }

        for slot in &self.chaughadiya {
            let kind = match slot.quality {
                SlotQuality::Good => EventKind::GoodChaughadiya,
                SlotQuality::Bad => EventKind::BadChaughadiya,
                SlotQuality::Neutral => continue,
            };
            push(
                kind,
                slot.start,
                format!("{} until {}", slot.name, slot.end.format("%H:%M")),
            );
        }

        for hora in &self.hora {
            push(EventKind::HoraChange, hora.start, format!("{} Hora", hora.planet));
        }

        if let Some(bhadra) = &self.bhadra {
            push(
                EventKind::BhadraWarning,
                bhadra.start,
                format!("Bhadra until {}", bhadra.end.format("%H:%M")),
            );
        }

        if let Some(panchak) = &self.panchak {
            push(
                EventKind::PanchakWarning,
                panchak.start,
                format!("Panchak until {}", panchak.end.format("%H:%M")),
            );
        }

        let mut at_sunrise = |kind, detail: String| {
            events.push(DailyEvent {
                kind,
                at: sunrise,
                detail,
            });
        };

        at_sunrise(EventKind::DailyTithi, self.tithi.name.clone());
        at_sunrise(EventKind::DailyNakshatra, self.nakshatra.name.clone());
        at_sunrise(EventKind::DailyYoga, self.yoga.name.clone());

        let tithi = self.tithi.name.to_ascii_lowercase();
        if tithi.contains("ekadashi") {
            at_sunrise(EventKind::Ekadashi, self.tithi.name.clone());
        }
        if tithi.contains("purnima") {
            at_sunrise(EventKind::Purnima, self.tithi.name.clone());
        }
        if tithi.contains("amavasya") {
            at_sunrise(EventKind::Amavasya, self.tithi.name.clone());
        }

        if let Some(direction) = &self.disha_shool {
            at_sunrise(EventKind::DishaShool, format!("Avoid travelling {direction}"));
        }

        events
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_day(date: &str, tithi: &str) -> PanchangDay {
        let json = serde_json::json!({
            "date": date,
            "sunrise": format!("{date}T06:20:00+05:30"),
            "tithi": {"name": tithi},
            "nakshatra": {"name": "Rohini"},
            "yoga": {"name": "Siddhi"},
            "rahu_kaal": {
                "start": format!("{date}T13:30:00+05:30"),
                "end": format!("{date}T15:00:00+05:30")
            },
            "abhijit_muhurat": {
                "start": format!("{date}T11:45:00+05:30"),
                "end": format!("{date}T12:30:00+05:30")
            },
            "chaughadiya": [
                {
                    "name": "Amrit",
                    "start": format!("{date}T06:20:00+05:30"),
                    "end": format!("{date}T07:50:00+05:30"),
                    "quality": "good"
                },
                {
                    "name": "Chal",
                    "start": format!("{date}T07:50:00+05:30"),
                    "end": format!("{date}T09:20:00+05:30"),
                    "quality": "neutral"
                },
                {
                    "name": "Kaal",
                    "start": format!("{date}T09:20:00+05:30"),
                    "end": format!("{date}T10:50:00+05:30"),
                    "quality": "bad"
                }
            ],
            "hora": [{"planet": "Sun", "start": format!("{date}T06:20:00+05:30")}],
            "bhadra": null,
            "disha_shool": "North"
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn events_cover_day_and_skip_neutral_slots() {
        let day = sample_day("2026-10-18", "Shukla Ekadashi");
        let events = day.events();

        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::Ekadashi));
        assert!(kinds.contains(&EventKind::GoodChaughadiya));
        assert!(kinds.contains(&EventKind::BadChaughadiya));
        assert!(!kinds.contains(&EventKind::Purnima));
        assert!(!kinds.contains(&EventKind::BhadraWarning));
        assert_eq!(
            kinds
                .iter()
                .filter(|k| matches!(k, EventKind::GoodChaughadiya | EventKind::BadChaughadiya))
                .count(),
            2
        );

        let rahu = events
            .iter()
            .find(|e| e.kind == EventKind::RahuKaalStart)
            .unwrap();
        assert_eq!(rahu.at.to_rfc3339(), "2026-10-18T08:00:00+00:00");
    }
}
