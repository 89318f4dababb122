//! XML summary report writer, reproducing the exact `<rcynic-summary>` shape
//! of the original tool (recovered from its final reporting pass).

use std::io::Write;

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::counters::CounterRegistry;
use crate::error::Outcome;

const SUMMARY_VERSION: &str = "1";

pub fn write_summary<W: Write>(sink: W, counters: &CounterRegistry) -> Result<()> {
    let mut writer = Writer::new_with_indent(sink, b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
        .context("could not write xml declaration")?;

    let hostname = gethostname();
    let date = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let mut root = BytesStart::new("rcynic-summary");
    root.push_attribute(("date", date.as_str()));
    root.push_attribute(("rcynic-version", env!("CARGO_PKG_VERSION")));
    root.push_attribute(("summary-version", SUMMARY_VERSION));
    root.push_attribute(("reporting-hostname", hostname.as_str()));
    writer.write_event(Event::Start(root))?;

    writer.write_event(Event::Start(BytesStart::new("labels")))?;
    write_element(&mut writer, "hostname", None, "Publication Repository")?;
    for outcome in Outcome::ALL {
        write_element(&mut writer, outcome.label(), Some(outcome.kind().to_string().as_str()), &outcome.to_string())?;
    }
    writer.write_event(Event::End(BytesEnd::new("labels")))?;

    for (hostname, host_counters) in counters.hosts() {
        writer.write_event(Event::Start(BytesStart::new("host")))?;
        write_element(&mut writer, "hostname", None, &hostname)?;
        for outcome in Outcome::ALL {
            write_element(&mut writer, outcome.label(), None, &host_counters.get(*outcome).to_string())?;
        }
        writer.write_event(Event::End(BytesEnd::new("host")))?;
    }

    for entry in counters.status_log() {
        let mut element = BytesStart::new("validation_status");
        let timestamp = entry.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        element.push_attribute(("timestamp", timestamp.as_str()));
        element.push_attribute(("status", entry.outcome.label()));
        writer.write_event(Event::Start(element))?;
        writer.write_event(Event::Text(BytesText::new(&entry.uri)))?;
        writer.write_event(Event::End(BytesEnd::new("validation_status")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("rcynic-summary")))?;
    writer.into_inner().flush().context("could not flush xml summary")?;
    Ok(())
}

fn write_element<W: Write>(writer: &mut Writer<W>, name: &str, kind: Option<&str>, text: &str) -> Result<()> {
    let mut start = BytesStart::new(name);
    if let Some(kind) = kind {
        start.push_attribute(("kind", kind));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn gethostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok().map(|s| s.trim().to_owned()))
        .unwrap_or_else(|| "unknown".to_owned())
}
