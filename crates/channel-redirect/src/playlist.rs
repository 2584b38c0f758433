//! M3U and TXT playlist rendering.
//!
//! Every entry points back at this service's redirect endpoint rather than
//! at a mirror, so players always go through channel resolution.

use crate::directory::{logo_url, Channel, DirectorySnapshot};

/// Path of the redirect endpoint that playlist entries link to.
pub const REDIRECT_PATH: &str = "/jptv.php";

/// Link target used when the directory is empty.
const PLACEHOLDER_URL: &str = "http://0.0.0.0/";

/// Inputs shared by both playlist formats.
pub struct PlaylistContext<'a> {
    /// Scheme and host of this service, without trailing slash.
    pub base_url: &'a str,
    pub epg_urls: &'a [String],
    pub logo_base_url: &'a str,
}

impl PlaylistContext<'_> {
    fn channel_link(&self, channel: &Channel) -> String {
        format!("{}{REDIRECT_PATH}?id={}", self.base_url, channel.id)
    }
}

/// Channels need a name and a URL field to be listed.
fn is_listed(channel: &Channel) -> bool {
    !channel.name.is_empty() && channel.urls.is_some()
}

pub fn render_m3u(snapshot: &DirectorySnapshot, ctx: &PlaylistContext<'_>) -> String {
    let mut out = format!(
        "#EXTM3U url-tvg=\"{}\" tvg-shift=0 m3uautoload=1\n",
        ctx.epg_urls.join(",")
    );

    if snapshot.is_empty() {
        out.push_str("#EXTINF:-1 group-title=\"提示\",无频道数据\n");
        out.push_str(PLACEHOLDER_URL);
        out.push('\n');
        return out;
    }

    for group in snapshot.groups() {
        for channel in group.channels.iter().filter(|c| is_listed(c)) {
            let tvg_id = if channel.id.is_empty() {
                &channel.name
            } else {
                &channel.id
            };
            out.push_str(&format!(
                "#EXTINF:-1 tvg-id=\"{tvg_id}\" tvg-name=\"{name}\" tvg-logo=\"{logo}\" group-title=\"{group}\",{name}\n",
                name = channel.name,
                logo = logo_url(ctx.logo_base_url, &channel.logo),
                group = group.group,
            ));
            out.push_str(&ctx.channel_link(channel));
            out.push('\n');
        }
    }
    out
}

pub fn render_txt(snapshot: &DirectorySnapshot, ctx: &PlaylistContext<'_>) -> String {
    if snapshot.is_empty() {
        return format!("提示,#genre#\n无数据,{PLACEHOLDER_URL}");
    }

    let mut lines = Vec::new();
    for group in snapshot.groups().iter().filter(|g| !g.channels.is_empty()) {
        lines.push(format!("{},#genre#", group.group));
        for channel in group.channels.iter().filter(|c| is_listed(c)) {
            lines.push(format!("{},{}", channel.name, ctx.channel_link(channel)));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}
