use pulse_core::common::TimeFrame;
use pulse_core::market::entity::KlineMessage;
use pulse_market::CandleAggregator;

fn closed(symbol: &str, timeframe: TimeFrame, index: i64) -> KlineMessage {
    let price = 100.0 + f64::from(i32::try_from(index).unwrap());
    KlineMessage {
        symbol: symbol.to_string(),
        timeframe,
        open: price,
        high: price + 1.0,
        low: price - 1.0,
        close: price,
        volume: 5.0,
        open_time: index * timeframe.seconds(),
        is_closed: true,
    }
}

/// # Summary
/// 多个线程并发写入不同分区，每个分区的窗口仍然有序且互不干扰。
#[test]
fn test_concurrent_partitions_stay_ordered() {
    let aggregator = CandleAggregator::new(50);
    let symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"];

    std::thread::scope(|scope| {
        for symbol in symbols {
            let aggregator = &aggregator;
            scope.spawn(move || {
                for i in 0..80 {
                    assert!(aggregator.ingest(&closed(symbol, TimeFrame::Hour1, i)).is_some());
                    assert!(aggregator.ingest(&closed(symbol, TimeFrame::Hour4, i)).is_some());
                }
            });
        }
    });

    assert_eq!(aggregator.pair_count(), 8);
    for symbol in symbols {
        let candles = aggregator.snapshot(symbol, TimeFrame::Hour1);
        assert_eq!(candles.len(), 50);
        assert!(candles.windows(2).all(|w| w[0].time < w[1].time));
        assert_eq!(candles.last().unwrap().close, 179.0);
        assert_eq!(candles.first().unwrap().close, 130.0);
    }
}

/// # Summary
/// 回放中混入的过期 K 线被丢弃，不产生收盘事件。
#[test]
fn test_stale_replay_is_ignored() {
    let aggregator = CandleAggregator::new(10);
    for i in 0..5 {
        aggregator.ingest(&closed("BTCUSDT", TimeFrame::Minute5, i));
    }
    assert!(aggregator.ingest(&closed("BTCUSDT", TimeFrame::Minute5, 2)).is_none());
    assert_eq!(aggregator.len("BTCUSDT", TimeFrame::Minute5), 5);
    let event = aggregator.ingest(&closed("BTCUSDT", TimeFrame::Minute5, 5)).unwrap();
    assert_eq!(event.timeframe, TimeFrame::Minute5);
    assert_eq!(event.candle.close, 105.0);
}
