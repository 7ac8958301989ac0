use pulse_core::common::TimeFrame;
use pulse_core::market::entity::KlineMessage;
use pulse_core::market::error::MarketError;
use serde::Deserialize;

/// 组合流外层包装 `{"stream": "...", "data": {...}}`
#[derive(Debug, Deserialize)]
struct Envelope {
    data: KlineEvent,
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "k")]
    kline: RawKline,
}

/// 交易所原始 K 线字段，价格与成交量以字符串编码
#[derive(Debug, Deserialize)]
struct RawKline {
    #[serde(rename = "t")]
    open_time_ms: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

fn number(field: &str, raw: &str) -> Result<f64, MarketError> {
    raw.parse::<f64>()
        .map_err(|e| MarketError::Parse(format!("{}: {} ({})", field, raw, e)))
}

/// # Summary
/// 解码一条 K 线推送。
///
/// # Logic
/// 1. 优先按组合流包装解析，失败时按裸事件解析。
/// 2. 仅接受 `kline` 事件，周期必须是已知代码。
/// 3. 开盘时间由毫秒转换为秒。
///
/// # Arguments
/// * `text` - WebSocket 文本帧。
///
/// # Returns
/// * `Result<KlineMessage, MarketError>` - 格式错误返回 `MarketError::Parse`，调用方跳过该消息。
pub fn decode(text: &str) -> Result<KlineMessage, MarketError> {
    let event = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => envelope.data,
        Err(_) => serde_json::from_str::<KlineEvent>(text)
            .map_err(|e| MarketError::Parse(e.to_string()))?,
    };
    if event.event_type != "kline" {
        return Err(MarketError::Parse(format!(
            "unexpected event type {}",
            event.event_type
        )));
    }

    let k = event.kline;
    let timeframe = k.interval.parse::<TimeFrame>().map_err(MarketError::Parse)?;
    Ok(KlineMessage {
        symbol: k.symbol.to_uppercase(),
        timeframe,
        open: number("open", &k.open)?,
        high: number("high", &k.high)?,
        low: number("low", &k.low)?,
        close: number("close", &k.close)?,
        volume: number("volume", &k.volume)?,
        open_time: k.open_time_ms.div_euclid(1000),
        is_closed: k.is_closed,
    })
}

/// 单个订阅的流名，例如 `btcusdt@kline_1h`
pub fn stream_name(symbol: &str, timeframe: TimeFrame) -> String {
    format!("{}@kline_{}", symbol.to_lowercase(), timeframe)
}

/// 组合流地址：基础地址后接以 `/` 连接的流名
pub fn combined_url(base: &str, streams: &[String]) -> String {
    format!("{}{}", base, streams.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMBINED: &str = r#"{
        "stream": "btcusdt@kline_1h",
        "data": {
            "e": "kline", "E": 1700000000123, "s": "BTCUSDT",
            "k": {
                "t": 1699999200000, "T": 1700002799999, "s": "BTCUSDT", "i": "1h",
                "f": 100, "L": 200, "o": "37000.10", "c": "37100.50", "h": "37150.00",
                "l": "36990.00", "v": "123.45", "n": 100, "x": true, "q": "0", "V": "0",
                "Q": "0", "B": "0"
            }
        }
    }"#;

    #[test]
    fn test_decode_combined_payload() {
        let msg = decode(COMBINED).unwrap();
        assert_eq!(msg.symbol, "BTCUSDT");
        assert_eq!(msg.timeframe, TimeFrame::Hour1);
        assert_eq!(msg.open_time, 1_699_999_200);
        assert_eq!(msg.close, 37100.50);
        assert!(msg.is_closed);
    }

    #[test]
    fn test_decode_bare_event() {
        let bare = r#"{"e":"kline","k":{"t":60000,"s":"ethusdt","i":"5m","o":"1","h":"2","l":"0.5","c":"1.5","v":"10","x":false}}"#;
        let msg = decode(bare).unwrap();
        assert_eq!(msg.symbol, "ETHUSDT");
        assert_eq!(msg.timeframe, TimeFrame::Minute5);
        assert_eq!(msg.open_time, 60);
        assert!(!msg.is_closed);
    }

    #[test]
    fn test_malformed_payloads_are_parse_errors() {
        assert!(matches!(decode("not json"), Err(MarketError::Parse(_))));
        let wrong_event = r#"{"e":"trade","k":{"t":0,"s":"X","i":"1h","o":"1","h":"1","l":"1","c":"1","v":"1","x":true}}"#;
        assert!(decode(wrong_event).is_err());
        let bad_price = COMBINED.replace("37100.50", "abc");
        assert!(decode(&bad_price).is_err());
        let bad_interval = COMBINED.replace("\"i\": \"1h\"", "\"i\": \"2w\"");
        assert!(decode(&bad_interval).is_err());
    }

    #[test]
    fn test_stream_naming() {
        assert_eq!(stream_name("BTCUSDT", TimeFrame::Hour4), "btcusdt@kline_4h");
        let url = combined_url(
            "wss://stream.example.com/stream?streams=",
            &["a@kline_1h".to_string(), "b@kline_1h".to_string()],
        );
        assert_eq!(url, "wss://stream.example.com/stream?streams=a@kline_1h/b@kline_1h");
    }
}
