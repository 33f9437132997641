pub mod decision;
pub mod description;
pub mod heuristic;
pub mod image;
pub mod metadata;
pub mod similarity;

pub use decision::DecisionMaker;
pub use description::DescriptionEmbedder;
pub use image::ImageAnalyzer;
pub use metadata::MetadataAnalyzer;
pub use similarity::SimilaritySearch;
