pub mod deepface_client;
pub mod face_selection;
pub mod feature_formatter;
pub mod frame;
pub mod model;
pub mod normalizer;
pub mod preprocess;
pub mod quality_gate;
