//! Fixed-column rendering of call events.
//!
//! The formatter only produces text. Writing it to the console or the
//! session log is the session controller's job.

use std::fmt;

use crate::event::CallEvent;
use crate::filter::FilterConfig;
use crate::lookup::NameLookup;

const REPEATER_WIDTH: usize = 17;
const COUNTRY_WIDTH: usize = 18;
const CITY_WIDTH: usize = 17;

/// Device names that say nothing about which repeater was used.
const GENERIC_LINK_NAMES: &[&str] = &["MMDVM Host", "Homebrew Repeater"];

/// One rendered output line, without a trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine(String);

impl DisplayLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The same line as written to the session log.
    pub fn log_line(&self) -> String {
        format!("{}\n", self.0)
    }
}

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders call events as table rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFormatter {
    show_name: bool,
}

impl EventFormatter {
    pub fn new(show_name: bool) -> Self {
        Self { show_name }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.show_name)
    }

    /// Column header matching [`render`](Self::render).
    pub fn header(&self) -> String {
        self.row(
            "UTC", "DMR ID", "Callsign", "Repeater/Node", "Talkgroup", "Peer", "Country", "City",
            "Name",
        )
    }

    /// A dashed rule as wide as the header.
    pub fn separator(&self) -> String {
        "-".repeat(self.header().chars().count())
    }

    /// Render an event, pulling name and location from `lookup`.
    ///
    /// Stations the lookup doesn't know get empty name and location columns.
    pub fn render<L>(&self, event: &CallEvent, lookup: &L) -> DisplayLine
    where
        L: NameLookup + ?Sized,
    {
        let subscriber = event
            .source_id
            .and_then(|id| lookup.by_id(id))
            .or_else(|| lookup.by_callsign(&event.callsign));

        let (name, country, city) = match subscriber {
            Some(s) => (
                s.first_name.as_str(),
                abbreviate(&s.country, COUNTRY_WIDTH),
                abbreviate(&s.city, CITY_WIDTH),
            ),
            None => ("", String::new(), String::new()),
        };

        let time = event.timestamp.format("%H:%M:%S").to_string();
        let dmr_id = event.source_id.map(|id| id.to_string()).unwrap_or_default();

        DisplayLine(self.row(
            &time,
            &dmr_id,
            &event.callsign,
            &repeater_label(event),
            &event.talkgroup.to_string(),
            &event.peer_id.to_string(),
            &country,
            &city,
            name,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn row(
        &self,
        time: &str,
        dmr_id: &str,
        callsign: &str,
        repeater: &str,
        talkgroup: &str,
        peer: &str,
        country: &str,
        city: &str,
        name: &str,
    ) -> String {
        let row = format!(
            "{:<8} | {:<8} | {:<8} | {:<17} | {:<9} | {:<6} | {:<18} | ",
            time, dmr_id, callsign, repeater, talkgroup, peer, country
        );
        if self.show_name {
            format!("{}{:<17} | {}", row, city, name)
        } else {
            format!("{}{}", row, city)
        }
    }
}

/// Render an event for `config` using `lookup` for names.
pub fn format<L>(event: &CallEvent, config: &FilterConfig, lookup: &L) -> DisplayLine
where
    L: NameLookup + ?Sized,
{
    EventFormatter::from_config(config).render(event, lookup)
}

/// Describe the repeater or hotspot an event came through.
///
/// Prefers the link callsign when it differs from the caller. Named
/// repeaters without a callsign show as `REPEATER`, everything else as
/// `HOTSPOT`.
pub fn repeater_label(event: &CallEvent) -> String {
    let link = &event.link;
    if !link.call.is_empty() && link.call != event.callsign {
        crop_at_word(&link.call, REPEATER_WIDTH)
    } else if link.kind == "Repeater"
        && !link.name.is_empty()
        && !GENERIC_LINK_NAMES.contains(&link.name.as_str())
    {
        "REPEATER".to_string()
    } else {
        "HOTSPOT".to_string()
    }
}

/// Cut `value` to at most `width` characters, backing up to the last space
/// when there is one.
fn crop_at_word(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let truncated: String = value.chars().take(width).collect();
    match truncated.rfind(' ') {
        Some(pos) if pos > 0 => truncated[..pos].to_string(),
        _ => truncated,
    }
}

/// Shorten `value` to roughly `width` characters: the last whole word that
/// fits, plus the first letter of the next word and a dot.
///
/// `"United States of America"` at width 18 becomes `"United States of A."`.
fn abbreviate(value: &str, width: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= width {
        return value.to_string();
    }
    let head = &chars[..width - 1];
    let cut = match head.iter().rposition(|&c| c == ' ') {
        Some(pos) if pos > 0 => pos + 2,
        _ => width - 1,
    };
    let mut out: String = chars[..cut].iter().collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, LinkInfo};
    use crate::lookup::{NoLookup, Subscriber};
    use chrono::{TimeZone, Utc};

    struct OneStation(Subscriber);

    impl NameLookup for OneStation {
        fn by_callsign(&self, callsign: &str) -> Option<&Subscriber> {
            (self.0.callsign == callsign).then_some(&self.0)
        }
    }

    fn matti() -> OneStation {
        OneStation(Subscriber {
            id: 2441234,
            callsign: "OH6ABC".to_string(),
            first_name: "Matti".to_string(),
            city: "Oulu".to_string(),
            country: "Finland".to_string(),
        })
    }

    fn make_event(link: LinkInfo) -> CallEvent {
        CallEvent {
            session_id: "s1".to_string(),
            kind: EventKind::SessionStop,
            callsign: "OH6ABC".to_string(),
            source_id: Some(2441234),
            talkgroup: 244,
            peer_id: 2441,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap(),
            duration: None,
            link,
        }
    }

    fn repeater(call: &str) -> LinkInfo {
        LinkInfo {
            call: call.to_string(),
            kind: "Repeater".to_string(),
            name: "Hytera".to_string(),
        }
    }

    #[test]
    fn test_render_without_name() {
        let line = EventFormatter::new(false).render(&make_event(repeater("OH6RAA")), &matti());
        assert_eq!(
            line.as_str(),
            "12:30:05 | 2441234  | OH6ABC   | OH6RAA            | 244       | 2441   | Finland            | Oulu"
        );
    }

    #[test]
    fn test_render_with_name() {
        let line = EventFormatter::new(true).render(&make_event(repeater("OH6RAA")), &matti());
        assert_eq!(
            line.as_str(),
            "12:30:05 | 2441234  | OH6ABC   | OH6RAA            | 244       | 2441   | Finland            | Oulu              | Matti"
        );
    }

    #[test]
    fn test_unknown_station_has_empty_name() {
        let line = EventFormatter::new(true).render(&make_event(LinkInfo::default()), &NoLookup);
        assert!(line.as_str().starts_with("12:30:05 | 2441234  | OH6ABC   | HOTSPOT "));
        assert!(line.as_str().ends_with("|                   | "));
    }

    #[test]
    fn test_render_is_idempotent() {
        let formatter = EventFormatter::new(true);
        let event = make_event(repeater("OH6RAA"));
        assert_eq!(
            formatter.render(&event, &matti()),
            formatter.render(&event, &matti())
        );
    }

    #[test]
    fn test_format_uses_config_toggle() {
        let config = FilterConfig::default().with_names(true);
        let line = format(&make_event(LinkInfo::default()), &config, &matti());
        assert!(line.as_str().ends_with("| Matti"));
    }

    #[test]
    fn test_log_line_has_trailing_newline() {
        let line = EventFormatter::new(false).render(&make_event(LinkInfo::default()), &NoLookup);
        assert_eq!(line.log_line(), format!("{}\n", line));
    }

    #[test]
    fn test_header_lines_up_with_rows() {
        let formatter = EventFormatter::new(true);
        let header = formatter.header();
        let row = formatter.render(&make_event(repeater("OH6RAA")), &matti());
        let header_bars: Vec<usize> = header.match_indices('|').map(|(i, _)| i).collect();
        let row_bars: Vec<usize> = row.as_str().match_indices('|').map(|(i, _)| i).collect();
        assert_eq!(header_bars, row_bars);
        assert_eq!(formatter.separator().len(), header.len());
    }

    #[test]
    fn test_repeater_label() {
        assert_eq!(repeater_label(&make_event(repeater("OH6RAA"))), "OH6RAA");

        // Link call equal to the caller is their own hotspot
        let own = LinkInfo {
            call: "OH6ABC".to_string(),
            kind: "Hotspot".to_string(),
            name: "MMDVM Host".to_string(),
        };
        assert_eq!(repeater_label(&make_event(own)), "HOTSPOT");

        // Own callsign on a named repeater still reads as a repeater
        assert_eq!(repeater_label(&make_event(repeater("OH6ABC"))), "REPEATER");

        let named = LinkInfo {
            call: String::new(),
            kind: "Repeater".to_string(),
            name: "Motorola SLR".to_string(),
        };
        assert_eq!(repeater_label(&make_event(named)), "REPEATER");

        let generic = LinkInfo {
            call: String::new(),
            kind: "Repeater".to_string(),
            name: "MMDVM Host".to_string(),
        };
        assert_eq!(repeater_label(&make_event(generic)), "HOTSPOT");
    }

    #[test]
    fn test_crop_at_word() {
        assert_eq!(crop_at_word("OH6RAA", 17), "OH6RAA");
        assert_eq!(crop_at_word("OH6RAA Oulu Linnanmaa", 17), "OH6RAA Oulu");
        assert_eq!(crop_at_word("ABCDEFGHIJKLMNOPQRSTUV", 17), "ABCDEFGHIJKLMNOPQ");
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("Finland", 18), "Finland");
        assert_eq!(abbreviate("United States of America", 18), "United States of A.");
        assert_eq!(abbreviate("Llanfairpwllgwyngyll", 17), "Llanfairpwllgwyn.");
        assert_eq!(abbreviate("Åland Islands Östra Finland", 18), "Åland Islands Ö.");
    }
}
