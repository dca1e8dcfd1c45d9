use crate::models::{Candle, TickClass, Timeframe};

/// A trade tick is logged as late when it arrives this long after its
/// venue timestamp. Late ticks are still processed.
const STALE_TICK_MS: i64 = 2000;

/// Ordered, gap-free candle sequence for one strategy instance
///
/// Driven by raw trade ticks from the venue stream. Only the last candle is
/// ever mutated; once a new bucket starts, prior candles are frozen.
/// Consecutive bucket-start timestamps always differ by exactly one
/// timeframe width, with skipped buckets filled by flat candles.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            candles: Vec::new(),
        }
    }

    /// Seed the series with historical candles fetched over REST
    pub fn with_history(timeframe: Timeframe, history: Vec<Candle>) -> Self {
        Self {
            timeframe,
            candles: history,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Fold one trade tick into the series
    ///
    /// `ts` is the venue trade timestamp and `now` the local arrival time,
    /// both in milliseconds. Returns how the tick related to the last
    /// bucket.
    pub fn apply_tick(&mut self, price: f64, size: f64, ts: i64, now: i64) -> TickClass {
        if now - ts >= STALE_TICK_MS {
            tracing::warn!(
                "stale tick for {} series: {} ms between arrival and trade time",
                self.timeframe,
                now - ts
            );
        }

        let width = self.timeframe.millis();

        let (last_ts, last_close) = match self.candles.last() {
            Some(last) => (last.ts, last.close),
            None => {
                // First tick ever seen: open the series at the tick's bucket
                let bucket_start = ts - ts.rem_euclid(width);
                self.candles.push(Candle {
                    ts: bucket_start,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: size,
                    timeframe: self.timeframe,
                });
                return TickClass::NewCandle;
            }
        };

        // Same bucket: update the in-progress candle
        if ts < last_ts + width {
            if let Some(last) = self.candles.last_mut() {
                last.close = price;
                last.volume += size;
                if price > last.high {
                    last.high = price;
                } else if price < last.low {
                    last.low = price;
                }
            }
            return TickClass::SameCandle;
        }

        // Skipped buckets get flat candles so the sequence stays gap-free
        if ts >= last_ts + 2 * width {
            let missing = (ts - last_ts) / width - 1;
            tracing::info!(
                "missing {} candle(s) for {} series ({} vs {})",
                missing,
                self.timeframe,
                ts,
                last_ts
            );

            let mut prev_ts = last_ts;
            for _ in 0..missing {
                prev_ts += width;
                self.candles
                    .push(Candle::flat(prev_ts, last_close, self.timeframe));
            }
        }

        // Open the tick's bucket
        let new_ts = self.candles.last().map(|c| c.ts).unwrap_or(last_ts) + width;
        self.candles.push(Candle {
            ts: new_ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size,
            timeframe: self.timeframe,
        });

        TickClass::NewCandle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TF: Timeframe = Timeframe::M1;
    const W: i64 = 60_000;

    fn seeded_series(start_ts: i64, closes: &[f64]) -> CandleSeries {
        let history = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                ts: start_ts + i as i64 * W,
                open: close,
                high: close,
                low: close,
                close,
                volume: 10.0,
                timeframe: TF,
            })
            .collect();
        CandleSeries::with_history(TF, history)
    }

    fn assert_gap_free(series: &CandleSeries) {
        let candles = series.candles();
        for pair in candles.windows(2) {
            assert_eq!(
                pair[1].ts,
                pair[0].ts + W,
                "bucket timestamps must increase by exactly one timeframe"
            );
        }
    }

    #[test]
    fn test_same_bucket_updates_last_candle() {
        let mut series = seeded_series(0, &[100.0]);

        let class = series.apply_tick(105.0, 2.0, 30_000, 30_000);
        assert_eq!(class, TickClass::SameCandle);

        let last = series.last().unwrap();
        assert_eq!(last.close, 105.0);
        assert_eq!(last.high, 105.0);
        assert_eq!(last.volume, 12.0);
        assert_eq!(series.len(), 1);

        let class = series.apply_tick(95.0, 1.0, 45_000, 45_000);
        assert_eq!(class, TickClass::SameCandle);
        let last = series.last().unwrap();
        assert_eq!(last.low, 95.0);
        assert_eq!(last.high, 105.0);
        assert_eq!(last.close, 95.0);
    }

    #[test]
    fn test_next_bucket_appends_candle() {
        let mut series = seeded_series(0, &[100.0]);

        let class = series.apply_tick(101.0, 3.0, 60_000, 60_000);
        assert_eq!(class, TickClass::NewCandle);
        assert_eq!(series.len(), 2);

        let last = series.last().unwrap();
        assert_eq!(last.ts, W);
        assert_eq!(last.open, 101.0);
        assert_eq!(last.high, 101.0);
        assert_eq!(last.low, 101.0);
        assert_eq!(last.close, 101.0);
        assert_eq!(last.volume, 3.0);
        assert_gap_free(&series);
    }

    #[test]
    fn test_two_skipped_buckets_fill_two_flat_candles() {
        let mut series = seeded_series(0, &[100.0]);
        series.apply_tick(104.0, 1.0, 10_000, 10_000);

        // Tick lands 3 buckets ahead: buckets 1 and 2 were skipped
        let class = series.apply_tick(110.0, 5.0, 3 * W + 1000, 3 * W + 1000);
        assert_eq!(class, TickClass::NewCandle);
        assert_eq!(series.len(), 4);

        let candles = series.candles();
        for filler in &candles[1..3] {
            assert_eq!(filler.open, 104.0);
            assert_eq!(filler.high, 104.0);
            assert_eq!(filler.low, 104.0);
            assert_eq!(filler.close, 104.0);
            assert_eq!(filler.volume, 0.0);
        }

        let real = &candles[3];
        assert_eq!(real.ts, 3 * W);
        assert_eq!(real.open, 110.0);
        assert_eq!(real.volume, 5.0);
        assert_gap_free(&series);
    }

    #[test]
    fn test_timestamps_strictly_increase_over_random_walk() {
        let mut series = seeded_series(0, &[100.0]);

        // Ticks that hop around buckets, including multi-bucket gaps
        let ticks: &[(f64, i64)] = &[
            (100.5, 10_000),
            (101.0, 59_999),
            (101.5, 60_000),
            (99.0, 150_000),
            (98.5, 400_000),
            (98.0, 401_000),
            (102.0, 460_000),
        ];

        for &(price, ts) in ticks {
            series.apply_tick(price, 1.0, ts, ts);
        }

        assert_gap_free(&series);
    }

    #[test]
    fn test_stale_tick_still_processed() {
        let mut series = seeded_series(0, &[100.0]);

        // Tick 5 seconds older than arrival time: logged but not dropped
        let class = series.apply_tick(103.0, 1.0, 20_000, 25_000);
        assert_eq!(class, TickClass::SameCandle);
        assert_eq!(series.last().unwrap().close, 103.0);
    }

    #[test]
    fn test_first_tick_aligns_bucket() {
        let mut series = CandleSeries::new(TF);
        let class = series.apply_tick(100.0, 1.0, 61_500, 61_500);
        assert_eq!(class, TickClass::NewCandle);
        assert_eq!(series.last().unwrap().ts, 60_000);
    }

    #[test]
    fn test_prior_candles_frozen_after_new_bucket() {
        let mut series = seeded_series(0, &[100.0]);
        series.apply_tick(105.0, 1.0, 30_000, 30_000);
        series.apply_tick(106.0, 1.0, 60_000, 60_000);

        let frozen = series.candles()[0].clone();
        series.apply_tick(107.0, 1.0, 70_000, 70_000);

        assert_eq!(series.candles()[0].close, frozen.close);
        assert_eq!(series.candles()[0].volume, frozen.volume);
    }
}
