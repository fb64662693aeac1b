// Shortsmith Overlay - SVG text card rendered to a full-frame PNG
//
// The overlay is a transparent 1080x1920 PNG the composer stacks on top
// of the footage. Hook and fact live in the text band above the footage,
// channel branding sits in the bottom padding. Layout is done here in SVG
// space with an approximate glyph width; the model's highlight words all
// share one accent color drawn at random per video.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::Rng;
use resvg::{tiny_skia, usvg};
use usvg_text_layout::{fontdb, TreeTextToPath};

use crate::config::Settings;
use crate::pipeline::GeneratedFact;

pub const HIGHLIGHT_COLORS: [&str; 7] = [
    "#FFD700", "#00E5FF", "#76FF03", "#FF9100", "#FF4081", "#B388FF", "#1DE9B6",
];

/// Average glyph width as a fraction of the font size. Close enough for
/// wrapping bold sans text; the fit loop below absorbs the error.
const CHAR_WIDTH_RATIO: f32 = 0.56;
const SIDE_MARGIN: u32 = 60;
const FONT_STEP: u32 = 4;
const MIN_FONT: u32 = 24;

pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Greedy word wrap using the approximate glyph width.
pub fn wrap_text(text: &str, font_px: u32, max_width_px: u32) -> Vec<String> {
    let max_chars = (max_width_px as f32 / (font_px as f32 * CHAR_WIDTH_RATIO)).max(1.0) as usize;
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if candidate_len > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Shrink the font until the wrapped text fits in `max_lines`.
pub fn fit_text(text: &str, start_px: u32, max_width_px: u32, max_lines: usize) -> (u32, Vec<String>) {
    let mut font_px = start_px;
    loop {
        let lines = wrap_text(text, font_px, max_width_px);
        if lines.len() <= max_lines || font_px <= MIN_FONT {
            return (font_px, lines);
        }
        font_px = font_px.saturating_sub(FONT_STEP).max(MIN_FONT);
    }
}

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

/// One line of fact text as SVG content, with highlight words wrapped in
/// tspans carrying the video's accent color.
fn line_markup(line: &str, highlights: &[String], color: &str) -> String {
    let mut parts = Vec::new();
    for word in line.split(' ') {
        let bare = normalize_word(word);
        let highlighted = !bare.is_empty()
            && highlights.iter().any(|h| normalize_word(h) == bare);
        if highlighted {
            parts.push(format!("<tspan fill=\"{}\">{}</tspan>", color, xml_escape(word)));
        } else {
            parts.push(xml_escape(word));
        }
    }
    parts.join(" ")
}

pub struct OverlayBuilder {
    width: u32,
    height: u32,
    text_band: u32,
    video_band: u32,
    font_hook: u32,
    font_fact: u32,
    channel_name: String,
    channel_handle: String,
    rng: Mutex<StdRng>,
}

impl OverlayBuilder {
    pub fn new(settings: &Settings, rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            width: settings.video_width,
            height: settings.video_height,
            text_band: settings.text_band_height(),
            video_band: settings.video_band_height,
            font_hook: settings.font_size_hook,
            font_fact: settings.font_size_fact,
            channel_name: settings.channel_name.clone(),
            channel_handle: settings.channel_handle.clone(),
        }
    }

    /// Build the full-frame overlay SVG for a fact. Each call draws one
    /// accent color for every highlight word in the video.
    pub fn build_svg(&self, fact: &GeneratedFact) -> String {
        let accent = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            HIGHLIGHT_COLORS[rng.gen_range(0..HIGHLIGHT_COLORS.len())]
        };
        let usable_width = self.width - 2 * SIDE_MARGIN;
        let (hook_px, hook_lines) = fit_text(&fact.hook, self.font_hook, usable_width, 3);
        let (fact_px, fact_lines) = fit_text(&fact.fact_text, self.font_fact, usable_width, 6);

        let hook_line_h = (hook_px as f32 * 1.25) as u32;
        let fact_line_h = (fact_px as f32 * 1.35) as u32;
        let center_x = self.width / 2;

        let mut body = String::new();
        let mut y = 160;
        for line in &hook_lines {
            body.push_str(&format!(
                "<text x=\"{center_x}\" y=\"{y}\" font-size=\"{hook_px}\" \
                 font-weight=\"bold\" fill=\"#FFFFFF\" text-anchor=\"middle\" \
                 font-family=\"DejaVu Sans, Arial, sans-serif\">{}</text>\n",
                xml_escape(line)
            ));
            y += hook_line_h;
        }

        y += fact_line_h / 2;
        for line in &fact_lines {
            body.push_str(&format!(
                "<text x=\"{center_x}\" y=\"{y}\" font-size=\"{fact_px}\" \
                 fill=\"#FFFFFF\" text-anchor=\"middle\" \
                 font-family=\"DejaVu Sans, Arial, sans-serif\">{}</text>\n",
                line_markup(line, &fact.highlight_words, accent)
            ));
            y += fact_line_h;
        }

        // Branding lives in the bottom padding below the footage band.
        let brand_y = self.text_band + self.video_band + 80;
        body.push_str(&format!(
            "<text x=\"{center_x}\" y=\"{brand_y}\" font-size=\"36\" \
             font-weight=\"bold\" fill=\"#FFFFFF\" text-anchor=\"middle\" \
             font-family=\"DejaVu Sans, Arial, sans-serif\">{}</text>\n",
            xml_escape(&self.channel_name)
        ));
        body.push_str(&format!(
            "<text x=\"{center_x}\" y=\"{}\" font-size=\"28\" \
             fill=\"#BBBBBB\" text-anchor=\"middle\" \
             font-family=\"DejaVu Sans, Arial, sans-serif\">{}</text>\n",
            brand_y + 44,
            xml_escape(&self.channel_handle)
        ));

        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" \
             viewBox=\"0 0 {} {}\">\n{}</svg>\n",
            self.width, self.height, self.width, self.height, body
        )
    }

    /// Render the overlay SVG to a transparent PNG at `output`.
    pub fn render_png(&self, fact: &GeneratedFact, output: &Path) -> Result<()> {
        let svg = self.build_svg(fact);

        let opt = usvg::Options::default();
        let mut tree = usvg::Tree::from_data(svg.as_bytes(), &opt)
            .context("overlay SVG did not parse")?;

        let mut fonts = fontdb::Database::new();
        fonts.load_system_fonts();
        tree.convert_text(&fonts);

        let mut pixmap = tiny_skia::Pixmap::new(self.width, self.height)
            .ok_or_else(|| anyhow!("could not allocate overlay pixmap"))?;
        resvg::render(
            &tree,
            usvg::FitTo::Original,
            tiny_skia::Transform::default(),
            pixmap.as_mut(),
        )
        .ok_or_else(|| anyhow!("overlay render produced no output"))?;

        pixmap
            .save_png(output)
            .with_context(|| format!("could not write overlay to {:?}", output))?;
        Ok(())
    }
}
