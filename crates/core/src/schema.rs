//! Fallback schema used when the vector store is unavailable.
//!
//! Retrieval failures and empty search results both substitute this static
//! description of the core market-data tables so SQL generation always has
//! something to work from.

/// Schema description for the core securities tables.
pub const DEFAULT_SCHEMA: &str = "\
The following are the main table schemas:

1. m_asset.exchange_kosdaq_stock_master (listed stock master)
   - stock_code: VARCHAR(10) - stock code
   - kor_name: VARCHAR(100) - stock name
   - kor_name_small: VARCHAR(50) - short stock name
   - market_type: VARCHAR(20) - market segment (KOSPI/KOSDAQ)
   - listed_shares: BIGINT - listed share count
   - capital_amount: BIGINT - capital amount
   - face_value: INTEGER - face value
   - data_date: DATE - as-of date

2. m_asset.exchange_kosdaq_stock_master_01 (daily prices)
   - stock_code: VARCHAR(10) - stock code
   - data_date: DATE - as-of date
   - close_price: NUMERIC - closing price
   - prev_close_price: NUMERIC - previous close
   - open_price: NUMERIC - opening price
   - high_price: NUMERIC - daily high
   - low_price: NUMERIC - daily low
   - trading_volume: BIGINT - traded volume
   - trading_amount: BIGINT - traded amount
   - market_cap: BIGINT - market capitalization
   - high_52w_price: NUMERIC - 52-week high
   - low_52w_price: NUMERIC - 52-week low
   - foreigner_holding_shares: BIGINT - foreign-held shares
   - foreigner_limit_ratio: NUMERIC - foreign ownership limit ratio

3. m_asset.industry_stock_mapping (industry mapping)
   - stock_code: VARCHAR(10) - stock code
   - industry_code: VARCHAR(20) - industry code
   - industry_name: VARCHAR(100) - industry name
   - market_type: VARCHAR(20) - market segment
   - data_date: DATE - as-of date

4. m_asset.daily_trade_execution_data (daily executions)
   - stock_code: VARCHAR(10) - stock code
   - data_date: DATE - as-of date
   - trade_time: TIME - execution time
   - trade_price: NUMERIC - execution price
   - trade_volume: BIGINT - executed quantity
   - accumulated_volume: BIGINT - cumulative volume
   - accumulated_amount: BIGINT - cumulative amount

Join notes:
- All tables join on stock_code and data_date.
- Filter data_date to the most recent date for current values.
- Prefer exchange_kosdaq_stock_master.kor_name_small for stock names.
";

/// The fallback schema as a retrieval-shaped example list.
pub fn basic_schema_examples() -> Vec<String> {
    vec![DEFAULT_SCHEMA.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_examples_are_non_empty() {
        let examples = basic_schema_examples();
        assert_eq!(examples.len(), 1);
        assert!(examples[0].contains("exchange_kosdaq_stock_master"));
    }
}
