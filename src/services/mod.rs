pub mod similarity;
pub mod ticker_directory;
pub mod resolver;
pub mod stock_data_store;
pub mod csv_archive;
pub mod news_analysis_service;
pub mod ingestion_service;
