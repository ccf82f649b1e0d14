//! Pneumonia X-ray classification service. A trained binary classifier is
//! loaded once per process and served over HTTP: clients upload a chest
//! X-ray, the service scores it, thresholds the score into a diagnosis, and
//! returns the result along with a color-tinted rendition of the input.

pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod server;
pub mod settings;
