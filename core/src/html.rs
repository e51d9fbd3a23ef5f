use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// One cell of a report row: the displayed image, its caption, and the
/// target the caption and image link to. Paths are relative to the page's
/// image directory.
#[derive(Clone, Debug)]
pub struct ImageCell {
    pub image: String,
    pub caption: String,
    pub link: String,
}

/// A browsable HTML document of titled sections, each holding rows of
/// images. Content accumulates in memory; `save` writes the whole document
/// to `<web_dir>/index.html`.
pub struct HtmlPage {
    web_dir: PathBuf,
    img_dir: PathBuf,
    title: String,
    refresh_secs: u32,
    body: String,
}

impl HtmlPage {
    /// Create a page rooted at `web_dir`, making `web_dir` and its `images`
    /// sub-directory if needed. Pass `refresh_secs > 0` to have the browser
    /// re-poll the document.
    pub fn new(web_dir: &Path, title: impl Into<String>, refresh_secs: u32) -> Result<Self> {
        let img_dir = web_dir.join("images");
        fs::create_dir_all(&img_dir)
            .with_context(|| format!("failed to create image directory {}", img_dir.display()))?;

        Ok(Self {
            web_dir: web_dir.to_path_buf(),
            img_dir,
            title: title.into(),
            refresh_secs,
            body: String::new(),
        })
    }

    pub fn image_dir(&self) -> &Path {
        &self.img_dir
    }

    /// Begin a new titled section.
    pub fn add_header(&mut self, text: &str) {
        let _ = writeln!(self.body, "<h3>{}</h3>", escape(text));
    }

    /// Append one table row of images, left to right in slice order, each
    /// rendered at `width` pixels with its caption underneath.
    pub fn add_images(&mut self, cells: &[ImageCell], width: u32) {
        self.body
            .push_str("<table border=\"1\" style=\"table-layout: fixed;\">\n<tr>\n");
        for cell in cells {
            let _ = writeln!(
                self.body,
                concat!(
                    "<td style=\"word-wrap: break-word;\" halign=\"center\" valign=\"top\">",
                    "<p><a href=\"images/{link}\"><img src=\"images/{image}\" ",
                    "style=\"width:{width}px\"></a><br><a href=\"images/{link}\">{caption}</a></p>",
                    "</td>"
                ),
                link = cell.link,
                image = cell.image,
                width = width,
                caption = escape(&cell.caption),
            );
        }
        self.body.push_str("</tr>\n</table>\n");
    }

    /// Write the document to `<web_dir>/index.html`.
    pub fn save(&self) -> Result<()> {
        let refresh = if self.refresh_secs > 0 {
            format!(
                "<meta http-equiv=\"refresh\" content=\"{}\">\n",
                self.refresh_secs
            )
        } else {
            String::new()
        };

        let document = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{refresh}\
             <title>{title}</title>\n</head>\n<body>\n{body}</body>\n</html>\n",
            refresh = refresh,
            title = escape(&self.title),
            body = self.body,
        );

        let path = self.web_dir.join("index.html");
        fs::write(&path, document)
            .with_context(|| format!("failed to write report to {}", path.display()))
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
