use crate::errors::{EngineError, EngineResult};
use crate::state::Tick;

// Deribit `ticker.{instrument}.{interval}` subscription notification:
// {
//   "jsonrpc": "2.0",
//   "method": "subscription",
//   "params": {
//     "channel": "ticker.BTC-27DEC24-60000-C.100ms",
//     "data": {
//       "instrument_name": "BTC-27DEC24-60000-C",
//       "timestamp": 1719000000000,
//       "mark_price": 0.0712,
//       "last_price": 0.07,
//       "mark_iv": 55.3,
//       "underlying_price": 61250.5,
//       "index_price": 61240.1
//     }
//   }
// }

#[derive(serde::Deserialize)]
struct Notification {
    params: Option<Params>,
}

#[derive(serde::Deserialize)]
struct Params {
    #[allow(dead_code)]
    channel: Option<String>,
    data: TickerData,
}

#[derive(serde::Deserialize)]
struct TickerData {
    instrument_name: String,
    timestamp: Option<i64>,
    mark_price: Option<f64>,
    last_price: Option<f64>,
    /// Percent, e.g. 55.3
    mark_iv: Option<f64>,
    underlying_price: Option<f64>,
    index_price: Option<f64>,
}

impl From<TickerData> for Tick {
    fn from(d: TickerData) -> Self {
        Tick {
            instrument_name: d.instrument_name,
            mark_price: d.mark_price.or(d.last_price),
            underlying_price: d.underlying_price.or(d.index_price),
            implied_vol: d.mark_iv.map(|iv| iv / 100.0),
            timestamp_ms: d.timestamp,
        }
    }
}

/// Decode one ticker notification into a [`Tick`].
///
/// Only extracts fields. Range checks happen when the tick is applied.
pub fn parse_ticker(raw: &str) -> EngineResult<Tick> {
    let note: Notification = serde_json::from_str(raw)?;
    let params = note
        .params
        .ok_or_else(|| EngineError::Parse("notification has no params".into()))?;

    if params.data.instrument_name.is_empty() {
        return Err(EngineError::Parse("empty instrument_name".into()));
    }
    Ok(params.data.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_notification() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": {
                "channel": "ticker.BTC-27DEC24-60000-C.100ms",
                "data": {
                    "instrument_name": "BTC-27DEC24-60000-C",
                    "timestamp": 1719000000000,
                    "mark_price": 0.0712,
                    "last_price": 0.07,
                    "mark_iv": 55.3,
                    "underlying_price": 61250.5,
                    "index_price": 61240.1,
                    "best_bid_price": 0.0705
                }
            }
        }"#;
        let tick = parse_ticker(raw).unwrap();
        assert_eq!(tick.instrument_name, "BTC-27DEC24-60000-C");
        assert_eq!(tick.mark_price, Some(0.0712));
        assert_eq!(tick.underlying_price, Some(61250.5));
        assert!((tick.implied_vol.unwrap() - 0.553).abs() < 1e-12);
        assert_eq!(tick.timestamp_ms, Some(1719000000000));
    }

    #[test]
    fn test_fallback_fields() {
        let raw = r#"{"params":{"data":{"instrument_name":"ETH-28MAR25-3000-P","last_price":0.05,"index_price":3010.0}}}"#;
        let tick = parse_ticker(raw).unwrap();
        assert_eq!(tick.mark_price, Some(0.05));
        assert_eq!(tick.underlying_price, Some(3010.0));
        assert_eq!(tick.implied_vol, None);
    }

    #[test]
    fn test_sparse_tick_decodes_without_fields() {
        let raw = r#"{"params":{"data":{"instrument_name":"BTC-PERPETUAL"}}}"#;
        let tick = parse_ticker(raw).unwrap();
        assert!(!tick.carries_fields());
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(parse_ticker("{oops"), Err(EngineError::Parse(_))));
        assert!(matches!(parse_ticker(r#"{"id":1,"result":[]}"#), Err(EngineError::Parse(_))));
        assert!(matches!(parse_ticker(r#"{"params":{"data":{"mark_iv":50.0}}}"#), Err(EngineError::Parse(_))));
        assert!(matches!(parse_ticker(r#"{"params":{"data":{"instrument_name":""}}}"#), Err(EngineError::Parse(_))));
    }
}
