use std::{
    fmt::Write as _,
    fs,
    fs::OpenOptions,
    io::Write as _,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::Local;

use crate::{
    config::ReporterOptions,
    html::{HtmlPage, ImageCell},
    image::{save_image, to_display_image},
    metrics::{LossSet, PlotSeries, VisualSet},
    rng::random_display_id,
};

/// Persists visual and scalar training progress to disk in human-browsable
/// form: per-epoch image snapshots, a rebuilt HTML gallery, and an
/// append-only loss log. A pure observer; it never touches training state.
///
/// One instance per process, owned by the training loop and called inline;
/// every operation is a single synchronous pass over the filesystem.
pub struct Reporter {
    display_id: u32,
    use_html: bool,
    no_html: bool,
    win_size: u32,
    name: String,
    web_dir: PathBuf,
    img_dir: PathBuf,
    log_path: PathBuf,
    saved: bool,
    plot_data: Vec<(String, PlotSeries)>,
}

impl Reporter {
    /// Set up the report directories and open the session log.
    ///
    /// Creates `<checkpoints_dir>/<name>` (and its `web/images` tree when
    /// HTML reporting is on) and appends a timestamped session header to
    /// `loss_log.txt`. Directory creation is idempotent; an existing log is
    /// appended to, never truncated.
    pub fn new(options: &ReporterOptions) -> Result<Self> {
        let run_dir = options.checkpoints_dir.join(&options.name);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create run directory {}", run_dir.display()))?;

        let use_html = options.is_train && !options.no_html;
        let web_dir = run_dir.join("web");
        let img_dir = web_dir.join("images");
        if use_html {
            println!("create web directory {}...", web_dir.display());
            fs::create_dir_all(&img_dir).with_context(|| {
                format!("failed to create image directory {}", img_dir.display())
            })?;
        }

        let log_path = run_dir.join("loss_log.txt");
        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open loss log {}", log_path.display()))?;
        writeln!(
            log_file,
            "================ Training Loss ({}) ================",
            Local::now().format("%c")
        )
        .with_context(|| format!("failed to write session header to {}", log_path.display()))?;

        Ok(Self {
            display_id: random_display_id(),
            use_html,
            no_html: options.no_html,
            win_size: options.crop_size,
            name: options.name.clone(),
            web_dir,
            img_dir,
            log_path,
            saved: false,
            plot_data: Vec::new(),
        })
    }

    pub fn display_id(&self) -> u32 {
        self.display_id
    }

    pub fn use_html(&self) -> bool {
        self.use_html
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Mark the current result set as not yet persisted. Called at the top
    /// of every epoch so at least one snapshot is saved per epoch.
    pub fn reset(&mut self) {
        self.saved = false;
    }

    /// Save the current visuals as this epoch's snapshot images and rebuild
    /// the HTML gallery.
    ///
    /// `save_result` overrides the persist decision for this call; `None`
    /// means "persist unless HTML output is disabled". Regardless of the
    /// override, the first call after `reset` persists. Only the first
    /// `max_num_images` batch entries of each label feed the snapshot.
    ///
    /// The gallery is rebuilt from scratch, newest epoch first, each section
    /// row referencing that epoch's `epoch{n:03}_{label}.png` files. Rows
    /// for epochs never displayed in this or a previous run point at files
    /// that were never written; see DESIGN.md.
    pub fn display_current_results(
        &mut self,
        visuals: &VisualSet,
        epoch: u32,
        save_result: Option<bool>,
        max_num_images: usize,
    ) -> Result<()> {
        let save_result = save_result.unwrap_or(!self.no_html);
        let needs_save = save_result || !self.saved;
        if !self.use_html || !needs_save {
            return Ok(());
        }
        self.saved = true;

        for (label, images) in visuals.iter() {
            let snapshot = to_display_image(&images.head(max_num_images))?;
            let path = self.img_dir.join(format!("epoch{epoch:03}_{label}.png"));
            save_image(&snapshot, &path, 1.0)?;
        }

        let mut page = HtmlPage::new(&self.web_dir, format!("Experiment name = {}", self.name), 0)?;
        for n in (1..=epoch).rev() {
            page.add_header(&format!("epoch [{n}]"));
            let cells: Vec<ImageCell> = visuals
                .labels()
                .map(|label| {
                    let file = format!("epoch{n:03}_{label}.png");
                    ImageCell {
                        image: file.clone(),
                        caption: label.to_string(),
                        link: file,
                    }
                })
                .collect();
            page.add_images(&cells, self.win_size);
        }
        page.save()
    }

    /// Accumulate one point per loss series for live plotting.
    ///
    /// Series are keyed by the joined metric names, so a loop that reports
    /// different loss groups at different frequencies gets one series per
    /// group. Points are held in memory for an external plotter; nothing is
    /// written to disk. An empty loss set is a no-op.
    pub fn plot_current_losses(&mut self, epoch: u32, counter_ratio: f64, losses: &LossSet) {
        if losses.is_empty() {
            return;
        }

        let key = losses.names().collect::<Vec<_>>().join("_");
        let index = match self.plot_data.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                let legend = losses.names().map(str::to_string).collect();
                self.plot_data.push((key, PlotSeries::new(legend)));
                self.plot_data.len() - 1
            }
        };
        let series = &mut self.plot_data[index].1;

        series.x.push(f64::from(epoch) + counter_ratio);
        let row = series
            .legend
            .iter()
            .map(|name| losses.get(name).map_or(f64::NAN, |v| v.mean()))
            .collect();
        series.y.push(row);
    }

    /// Accumulated plot points, one entry per loss-name group, in first-seen
    /// order.
    pub fn plot_series(&self) -> impl Iterator<Item = (&str, &PlotSeries)> {
        self.plot_data
            .iter()
            .map(|(key, series)| (key.as_str(), series))
    }

    /// Print one loss line to stdout and append it to the session log.
    ///
    /// The log file is opened and closed for this single append, so no
    /// handle outlives the call.
    pub fn print_current_losses(
        &self,
        iters: u64,
        times: &[(&str, f64)],
        losses: &LossSet,
    ) -> Result<()> {
        let message = format_loss_line(iters, times, losses);
        println!("{message}");

        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("failed to open loss log {}", self.log_path.display()))?;
        writeln!(log_file, "{message}")
            .with_context(|| format!("failed to append to loss log {}", self.log_path.display()))
    }
}

/// `(iters: N, time: T, ...) loss: V ...` with 3-decimal values and a
/// trailing space; the exact line downstream log scrapers parse.
fn format_loss_line(iters: u64, times: &[(&str, f64)], losses: &LossSet) -> String {
    let mut message = format!("(iters: {iters}");
    for (name, seconds) in times {
        let _ = write!(message, ", {name}: {seconds:.3}");
    }
    message.push_str(") ");
    for (name, value) in losses.iter() {
        let _ = write!(message, "{name}: {:.3} ", value.mean());
    }
    message
}

/// Save every image in `visuals` under the page's image directory and append
/// one gallery row for them.
///
/// The section (and every file) is named after the extension-stripped
/// basename of the first source path; one `<label>/<name>.png` file is
/// written per label, with the label directory created on first use.
pub fn save_images(
    page: &mut HtmlPage,
    visuals: &VisualSet,
    image_paths: &[PathBuf],
    aspect_ratio: f64,
    width: u32,
) -> Result<()> {
    let first = image_paths
        .first()
        .ok_or_else(|| anyhow!("save_images called with no source image path"))?;
    let name = first
        .file_stem()
        .ok_or_else(|| anyhow!("source image path {} has no file name", first.display()))?
        .to_string_lossy()
        .into_owned();

    page.add_header(&name);

    let mut cells = Vec::with_capacity(visuals.len());
    for (label, images) in visuals.iter() {
        let display = to_display_image(images)?;
        let label_dir = page.image_dir().join(label);
        fs::create_dir_all(&label_dir)
            .with_context(|| format!("failed to create label directory {}", label_dir.display()))?;

        let relative = format!("{label}/{name}.png");
        save_image(&display, &page.image_dir().join(&relative), aspect_ratio)?;
        cells.push(ImageCell {
            image: relative.clone(),
            caption: label.to_string(),
            link: relative,
        });
    }
    page.add_images(&cells, width);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageBatch;
    use tempfile::tempdir;

    fn options(dir: &Path) -> ReporterOptions {
        ReporterOptions {
            crop_size: 64,
            ..ReporterOptions::new(dir, "testrun")
        }
    }

    fn visuals() -> VisualSet {
        let mut set = VisualSet::new();
        set.insert("real_A", ImageBatch::filled(2, 3, 4, 4, -0.5));
        set.insert("fake_B", ImageBatch::filled(2, 3, 4, 4, 0.5));
        set
    }

    fn header_count(log: &str) -> usize {
        log.lines()
            .filter(|line| {
                line.starts_with("================ Training Loss (")
                    && line.ends_with(") ================")
            })
            .count()
    }

    #[test]
    fn construction_appends_one_session_header() {
        let dir = tempdir().unwrap();
        let reporter = Reporter::new(&options(dir.path())).unwrap();

        let log = fs::read_to_string(reporter.log_path()).unwrap();
        assert_eq!(header_count(&log), 1);
        assert_eq!(log.lines().count(), 1);

        // A second construction appends a second header without touching
        // the first.
        let reporter = Reporter::new(&options(dir.path())).unwrap();
        let log = fs::read_to_string(reporter.log_path()).unwrap();
        assert_eq!(header_count(&log), 2);
    }

    #[test]
    fn print_current_losses_formats_the_documented_line() {
        let dir = tempdir().unwrap();
        let reporter = Reporter::new(&options(dir.path())).unwrap();

        let mut losses = LossSet::new();
        losses.insert("G", 2.5);
        reporter
            .print_current_losses(5, &[("compute", 0.1234)], &losses)
            .unwrap();

        let log = fs::read_to_string(reporter.log_path()).unwrap();
        assert_eq!(log.lines().last().unwrap(), "(iters: 5, compute: 0.123) G: 2.500 ");
    }

    #[test]
    fn loss_line_takes_the_mean_of_series_values() {
        let mut losses = LossSet::new();
        losses.insert("G", vec![1.0, 2.0]);
        losses.insert("D", 0.25);

        let line = format_loss_line(12, &[("comp", 0.5), ("data", 0.0625)], &losses);
        assert_eq!(line, "(iters: 12, comp: 0.500, data: 0.062) G: 1.500 D: 0.250 ");
    }

    #[test]
    fn display_writes_snapshots_and_rebuilds_newest_first() {
        let dir = tempdir().unwrap();
        let mut reporter = Reporter::new(&options(dir.path())).unwrap();
        let visuals = visuals();

        for epoch in 1..=3 {
            reporter.reset();
            reporter
                .display_current_results(&visuals, epoch, None, 4)
                .unwrap();
        }

        let img_dir = dir.path().join("testrun/web/images");
        for epoch in 1..=3 {
            assert!(img_dir.join(format!("epoch{epoch:03}_real_A.png")).exists());
            assert!(img_dir.join(format!("epoch{epoch:03}_fake_B.png")).exists());
        }

        let html = fs::read_to_string(dir.path().join("testrun/web/index.html")).unwrap();
        let newest = html.find("epoch [3]").unwrap();
        let oldest = html.find("epoch [1]").unwrap();
        assert!(newest < oldest);
        assert!(html.contains("epoch002_fake_B.png"));
    }

    #[test]
    fn saved_flag_gates_repeat_saves_until_reset() {
        let dir = tempdir().unwrap();
        let mut reporter = Reporter::new(&options(dir.path())).unwrap();
        let visuals = visuals();
        let index = dir.path().join("testrun/web/index.html");

        reporter
            .display_current_results(&visuals, 1, Some(false), 4)
            .unwrap();
        assert!(index.exists());

        // Already saved this run and the override says no: nothing happens.
        fs::remove_file(&index).unwrap();
        reporter
            .display_current_results(&visuals, 1, Some(false), 4)
            .unwrap();
        assert!(!index.exists());

        // The default override persists even when the flag is set.
        reporter
            .display_current_results(&visuals, 1, None, 4)
            .unwrap();
        assert!(index.exists());

        // And reset re-arms the flag for an explicit-false call.
        fs::remove_file(&index).unwrap();
        reporter.reset();
        reporter
            .display_current_results(&visuals, 1, Some(false), 4)
            .unwrap();
        assert!(index.exists());
    }

    #[test]
    fn display_is_inert_when_html_is_disabled() {
        let dir = tempdir().unwrap();
        let mut no_html = options(dir.path());
        no_html.no_html = true;
        let mut reporter = Reporter::new(&no_html).unwrap();
        assert!(!reporter.use_html());

        reporter
            .display_current_results(&visuals(), 1, None, 4)
            .unwrap();
        assert!(!dir.path().join("testrun/web").exists());
        // The loss log still exists regardless of the HTML toggle.
        assert!(reporter.log_path().exists());
    }

    #[test]
    fn plot_accumulates_per_key_series() {
        let dir = tempdir().unwrap();
        let mut reporter = Reporter::new(&options(dir.path())).unwrap();

        reporter.plot_current_losses(1, 0.0, &LossSet::new());
        assert_eq!(reporter.plot_series().count(), 0);

        let mut losses = LossSet::new();
        losses.insert("G", 1.0);
        losses.insert("D", 2.0);
        reporter.plot_current_losses(1, 0.25, &losses);

        let mut losses = LossSet::new();
        losses.insert("G", 0.5);
        losses.insert("D", 1.5);
        reporter.plot_current_losses(1, 0.75, &losses);

        let (key, series) = reporter.plot_series().next().unwrap();
        assert_eq!(key, "G_D");
        assert_eq!(series.legend, ["G", "D"]);
        assert_eq!(series.x, [1.25, 1.75]);
        assert_eq!(series.y, [vec![1.0, 2.0], vec![0.5, 1.5]]);

        // A different name set opens a second series.
        let mut val = LossSet::new();
        val.insert("val_G", 0.1);
        reporter.plot_current_losses(2, 0.0, &val);
        assert_eq!(reporter.plot_series().count(), 2);
    }

    #[test]
    fn save_images_writes_one_file_per_label() {
        let dir = tempdir().unwrap();
        let mut page = HtmlPage::new(&dir.path().join("web"), "gallery", 0).unwrap();

        let sources = vec![PathBuf::from("datasets/night2day/val/0001_AtoB.jpg")];
        save_images(&mut page, &visuals(), &sources, 1.0, 256).unwrap();
        page.save().unwrap();

        assert!(page.image_dir().join("real_A/0001_AtoB.png").exists());
        assert!(page.image_dir().join("fake_B/0001_AtoB.png").exists());

        let html = fs::read_to_string(dir.path().join("web/index.html")).unwrap();
        assert!(html.contains("<h3>0001_AtoB</h3>"));
        assert!(html.contains("images/real_A/0001_AtoB.png"));
    }

    #[test]
    fn save_images_requires_a_source_path() {
        let dir = tempdir().unwrap();
        let mut page = HtmlPage::new(&dir.path().join("web"), "gallery", 0).unwrap();
        assert!(save_images(&mut page, &visuals(), &[], 1.0, 256).is_err());
    }

    #[test]
    fn save_images_with_empty_visuals_keeps_the_header() {
        let dir = tempdir().unwrap();
        let mut page = HtmlPage::new(&dir.path().join("web"), "gallery", 0).unwrap();

        let sources = vec![PathBuf::from("sample.png")];
        save_images(&mut page, &VisualSet::new(), &sources, 1.0, 256).unwrap();
        page.save().unwrap();

        let html = fs::read_to_string(dir.path().join("web/index.html")).unwrap();
        assert!(html.contains("<h3>sample</h3>"));
        assert!(!html.contains("<img"));
    }
}
