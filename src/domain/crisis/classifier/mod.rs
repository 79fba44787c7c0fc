pub mod keyword_classifier;
