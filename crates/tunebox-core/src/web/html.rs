//! Station form and acknowledgement page rendering.

use core::fmt::{self, Write};

use crate::registry::StationRegistry;
use crate::station::{NAME_TEXT_MAX, URL_TEXT_MAX};

/// Upper bound for a rendered page: five slots of fully escaped values plus
/// the form boilerplate.
pub const PAGE_LEN: usize = 8192;

pub type Page = heapless::String<PAGE_LEN>;

/// The root form: one labelled name/url input pair and a play trigger per
/// slot, one submit button. Pure projection of the registry.
pub fn render_root(registry: &StationRegistry) -> Result<Page, fmt::Error> {
    let mut page = Page::new();
    page.push_str(
        "<!DOCTYPE html><html><head><meta charset='utf-8'>\
         <title>Radio Stations</title></head><body>\
         <h1>Radio Stations</h1><form action='/save' method='POST'>",
    )
    .map_err(|_| fmt::Error)?;

    for (i, station) in registry.iter().enumerate() {
        write!(page, "<h3>Station {}</h3>", i + 1)?;
        write!(page, "Name:<br><input type='text' name='name{i}' value='")?;
        escape_into(&mut page, &station.name)?;
        write!(page, "' maxlength='{NAME_TEXT_MAX}'><br>")?;
        write!(page, "URL:<br><input type='text' name='url{i}' value='")?;
        escape_into(&mut page, &station.url)?;
        write!(
            page,
            "' maxlength='{URL_TEXT_MAX}' style='width: 400px;'><br>"
        )?;
        write!(
            page,
            "<button type='button' onclick=\"location.href='/play?idx={i}'\">Play</button><hr>"
        )?;
    }

    page.push_str("<input type='submit' value='Save stations'></form></body></html>")
        .map_err(|_| fmt::Error)?;
    Ok(page)
}

/// Short acknowledgement that bounces the browser back to the form after a
/// second, whether or not the play request actually started a stream.
pub fn render_play_ack(index: i32, started: bool) -> Result<Page, fmt::Error> {
    let mut page = Page::new();
    page.push_str("<html><head><meta http-equiv='refresh' content='1; url=/'></head><body>")
        .map_err(|_| fmt::Error)?;
    if started {
        write!(page, "Playing station {}. Returning...", index + 1)?;
    } else {
        write!(page, "Station {} is not playable. Returning...", index + 1)?;
    }
    page.push_str("</body></html>").map_err(|_| fmt::Error)?;
    Ok(page)
}

fn escape_into(out: &mut Page, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;").map_err(|_| fmt::Error)?,
            '<' => out.push_str("&lt;").map_err(|_| fmt::Error)?,
            '>' => out.push_str("&gt;").map_err(|_| fmt::Error)?,
            '"' => out.push_str("&quot;").map_err(|_| fmt::Error)?,
            '\'' => out.push_str("&#39;").map_err(|_| fmt::Error)?,
            other => out.push(other).map_err(|_| fmt::Error)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_renders_every_slot() {
        let mut registry = StationRegistry::new();
        assert!(registry.apply_update(0, "Jazz", "http://a.fm"));

        let page = render_root(&registry).unwrap();
        assert!(page.contains("name='name0' value='Jazz'"));
        assert!(page.contains("name='url0' value='http://a.fm'"));
        for i in 0..5 {
            assert!(page.contains(&format!("name='name{i}'")));
            assert!(page.contains(&format!("/play?idx={i}")));
        }
    }

    #[test]
    fn values_are_escaped() {
        let mut registry = StationRegistry::new();
        assert!(registry.apply_update(0, "A & B's <FM>", "http://x"));

        let page = render_root(&registry).unwrap();
        assert!(page.contains("value='A &amp; B&#39;s &lt;FM&gt;'"));
    }

    #[test]
    fn worst_case_page_fits_the_buffer() {
        // Five slots of maximum-length values made entirely of characters
        // that escape to 5-6 bytes each.
        let name = "'".repeat(NAME_TEXT_MAX);
        let url = "&".repeat(URL_TEXT_MAX);
        let mut registry = StationRegistry::new();
        for i in 0..5 {
            assert!(registry.apply_update(i, &name, &url));
        }
        assert!(render_root(&registry).is_ok());
    }

    #[test]
    fn ack_page_reports_both_outcomes() {
        let ok = render_play_ack(2, true).unwrap();
        assert!(ok.contains("Playing station 3."));
        assert!(ok.contains("refresh"));

        let rejected = render_play_ack(2, false).unwrap();
        assert!(rejected.contains("not playable"));
    }
}
