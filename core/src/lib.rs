pub mod config;
pub mod html;
pub mod image;
pub mod metrics;
pub mod reporter;
pub mod rng;

pub use config::{load_or_init, ReporterOptions};
pub use html::{HtmlPage, ImageCell};
pub use image::{save_image, to_display_image, ImageBatch};
pub use metrics::{LossSet, LossValue, PlotSeries, VisualSet};
pub use reporter::{save_images, Reporter};
pub use rng::{random_display_id, seeded_rng};
