pub mod ticker_queries;
pub mod stock_data_queries;
