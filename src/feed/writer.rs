use crate::pipeline::EnrichedEntry;
use anyhow::{Context, Result};
use chrono::Utc;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";
const GENERATOR: &str = concat!("fullfeed/", env!("CARGO_PKG_VERSION"));

/// Channel-level metadata of the enriched feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub title: String,
    /// URL of the source feed.
    pub link: String,
    pub description: String,
    pub language: String,
}

/// Guess an enclosure MIME type from the image URL's extension.
fn image_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => "image/jpeg",
    }
}

fn text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))
        .with_context(|| format!("Failed to write <{name}>"))?;
    Ok(())
}

fn write_item<W: std::io::Write>(writer: &mut Writer<W>, entry: &EnrichedEntry) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("item")))
        .context("Failed to write item element")?;

    writer
        .create_element("guid")
        .with_attribute(("isPermaLink", "false"))
        .write_text_content(BytesText::new(&entry.id))
        .context("Failed to write <guid>")?;
    text_element(writer, "title", &entry.title)?;
    text_element(writer, "link", &entry.link)?;
    text_element(writer, "content:encoded", &entry.content)?;

    if let Some(published) = entry.published {
        text_element(writer, "pubDate", &published.to_rfc2822())?;
    }

    if let Some(image) = &entry.images.article_image {
        writer
            .create_element("enclosure")
            .with_attributes([
                ("url", image.as_str()),
                ("length", "0"),
                ("type", image_mime(image)),
            ])
            .write_empty()
            .context("Failed to write <enclosure>")?;
    }

    for tag in &entry.tags {
        text_element(writer, "category", tag)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("item")))
        .context("Failed to write item end")?;
    Ok(())
}

/// Serialize the enriched feed as an RSS 2.0 document.
///
/// Items are written in the order given. Full article HTML goes in
/// `content:encoded`, the article image becomes an `enclosure`, and each tag
/// a `category`.
pub fn write_rss(channel: &Channel, entries: &[EnrichedEntry]) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:content", CONTENT_NS));
    writer
        .write_event(Event::Start(rss))
        .context("Failed to write rss element")?;
    writer
        .write_event(Event::Start(BytesStart::new("channel")))
        .context("Failed to write channel element")?;

    text_element(&mut writer, "title", &channel.title)?;
    text_element(&mut writer, "link", &channel.link)?;
    text_element(&mut writer, "description", &channel.description)?;
    text_element(&mut writer, "language", &channel.language)?;
    text_element(&mut writer, "generator", GENERATOR)?;
    text_element(&mut writer, "lastBuildDate", &Utc::now().to_rfc2822())?;

    for entry in entries {
        write_item(&mut writer, entry)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .context("Failed to write channel end")?;
    writer
        .write_event(Event::End(BytesEnd::new("rss")))
        .context("Failed to write rss end")?;

    Ok(writer.into_inner().into_inner())
}
