use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rq_types::{internal_error, Asset, Event, EventSink, Feed, PriceItem, RqResult, Timeframe};

use crate::vec_feed::VecFeed;

/// One wire record of the persisted binary feed format (§6, C17):
/// `{time, asset, item, meta}`. `meta` carries source-specific annotations
/// (e.g. a vendor's tick sequence number) that don't belong on [`PriceItem`]
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub time: DateTime<Utc>,
    pub asset: Asset,
    pub item: PriceItem,
    pub meta: BTreeMap<String, String>,
}

impl FeedRecord {
    pub fn new(time: DateTime<Utc>, asset: Asset, item: PriceItem) -> Self {
        Self { time, asset, item, meta: BTreeMap::new() }
    }
}

/// Locates the compressed block, by byte offset, holding the earliest
/// record at or after `first_time`. One entry per written block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockIndexEntry {
    pub first_time: DateTime<Utc>,
    pub offset: u64,
    pub compressed_len: u32,
}

/// The full block index for one feed file (§6, C17): ordered by
/// `first_time`, giving O(log N) seek to any timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedIndex {
    pub blocks: Vec<BlockIndexEntry>,
}

impl FeedIndex {
    /// Index of the last block whose `first_time <= time`, i.e. the first
    /// block that could contain a record at or after `time`.
    pub fn seek_block(&self, time: DateTime<Utc>) -> Option<usize> {
        match self.blocks.partition_point(|b| b.first_time <= time) {
            0 => None,
            n => Some(n - 1),
        }
    }
}

/// Writes blocks of [`FeedRecord`]s, each snappy-compressed and
/// length-prefixed, building a [`FeedIndex`] as it goes (§6, C17).
pub struct BinaryFeedWriter<W> {
    writer: W,
    index: FeedIndex,
    offset: u64,
}

impl<W: Write> BinaryFeedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, index: FeedIndex::default(), offset: 0 }
    }

    /// Writes one block. `records` must already be in non-decreasing time
    /// order; a block boundary carries no semantics beyond compression
    /// granularity and index resolution.
    pub fn write_block(&mut self, records: &[FeedRecord]) -> RqResult<()> {
        let Some(first) = records.first() else { return Ok(()) };
        let json = serde_json::to_vec(records)?;
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&json)
            .map_err(|e| internal_error!("feed block compression failed: {e}"))?;
        let len = compressed.len() as u32;

        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&compressed)?;

        self.index.blocks.push(BlockIndexEntry { first_time: first.time, offset: self.offset, compressed_len: len });
        self.offset += 4 + len as u64;
        Ok(())
    }

    /// Consumes the writer, handing back the underlying sink and the index
    /// built while writing (persist the index alongside the data file).
    pub fn finish(self) -> (W, FeedIndex) {
        (self.writer, self.index)
    }
}

/// Reads blocks back out of a [`BinaryFeedWriter`]'s output, seeking
/// straight to the block covering a requested start time via the index
/// (§6, C17).
pub struct BinaryFeedReader<R> {
    reader: R,
    index: FeedIndex,
}

impl<R: Read + Seek> BinaryFeedReader<R> {
    pub fn new(reader: R, index: FeedIndex) -> Self {
        Self { reader, index }
    }

    /// Decodes every record from the block covering `from` onward.
    pub fn read_from(&mut self, from: DateTime<Utc>) -> RqResult<Vec<FeedRecord>> {
        let start = self.index.seek_block(from).unwrap_or(0);
        let mut records = Vec::new();
        for entry in self.index.blocks[start..].to_vec() {
            records.extend(self.read_block(&entry)?);
        }
        records.retain(|r| r.time >= from);
        Ok(records)
    }

    /// Decodes every record in the file, ignoring the index.
    pub fn read_all(&mut self) -> RqResult<Vec<FeedRecord>> {
        let blocks = self.index.blocks.clone();
        let mut records = Vec::new();
        for entry in &blocks {
            records.extend(self.read_block(entry)?);
        }
        Ok(records)
    }

    fn read_block(&mut self, entry: &BlockIndexEntry) -> RqResult<Vec<FeedRecord>> {
        self.reader.seek(SeekFrom::Start(entry.offset))?;
        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut compressed = vec![0u8; len];
        self.reader.read_exact(&mut compressed)?;
        let json = snap::raw::Decoder::new()
            .decompress_vec(&compressed)
            .map_err(|e| internal_error!("feed block decompression failed: {e}"))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// A [`Feed`] replaying records decoded from the persisted binary format
/// (§6, C17). Groups same-timestamp records from possibly many assets into
/// one [`Event`] each, same as [`VecFeed`] expects.
pub struct BinaryFeed {
    inner: VecFeed,
}

impl BinaryFeed {
    pub fn from_records(records: Vec<FeedRecord>) -> Self {
        let mut grouped: BTreeMap<DateTime<Utc>, Vec<(Asset, PriceItem)>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.time).or_default().push((record.asset, record.item));
        }
        let events = grouped.into_iter().map(|(time, items)| Event::new(time, items)).collect();
        Self { inner: VecFeed::new(events) }
    }
}

#[async_trait]
impl Feed for BinaryFeed {
    async fn play(&self, sink: &dyn EventSink) -> RqResult<()> {
        self.inner.play(sink).await
    }

    fn timeframe(&self) -> Timeframe {
        self.inner.timeframe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_types::Currency;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn abc() -> Asset {
        Asset::stock("ABC", Currency::usd())
    }

    fn record_at(secs: i64, price: rust_decimal::Decimal) -> FeedRecord {
        FeedRecord::new(
            DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(secs),
            abc(),
            PriceItem::TradePrice { price, volume: dec!(1) },
        )
    }

    #[test]
    fn round_trips_records_through_compressed_blocks() {
        let mut writer = BinaryFeedWriter::new(Cursor::new(Vec::new()));
        writer.write_block(&[record_at(0, dec!(100)), record_at(1, dec!(101))]).unwrap();
        writer.write_block(&[record_at(2, dec!(102))]).unwrap();
        let (cursor, index) = writer.finish();

        assert_eq!(index.blocks.len(), 2);
        let mut reader = BinaryFeedReader::new(cursor, index);
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].time, record_at(2, dec!(0)).time);
    }

    #[test]
    fn read_from_seeks_past_earlier_blocks() {
        let mut writer = BinaryFeedWriter::new(Cursor::new(Vec::new()));
        writer.write_block(&[record_at(0, dec!(100))]).unwrap();
        writer.write_block(&[record_at(10, dec!(110))]).unwrap();
        writer.write_block(&[record_at(20, dec!(120))]).unwrap();
        let (cursor, index) = writer.finish();

        let mut reader = BinaryFeedReader::new(cursor, index);
        let records = reader.read_from(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(15)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, record_at(20, dec!(0)).time);
    }

    #[test]
    fn seek_block_finds_containing_block_by_first_time() {
        let index = FeedIndex {
            blocks: vec![
                BlockIndexEntry { first_time: DateTime::<Utc>::UNIX_EPOCH, offset: 0, compressed_len: 10 },
                BlockIndexEntry {
                    first_time: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(100),
                    offset: 14,
                    compressed_len: 20,
                },
            ],
        };
        let t = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(50);
        assert_eq!(index.seek_block(t), Some(0));
        let t2 = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(150);
        assert_eq!(index.seek_block(t2), Some(1));
    }

    #[tokio::test]
    async fn binary_feed_groups_same_timestamp_records_into_one_event() {
        let xyz = Asset::stock("XYZ", Currency::usd());
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let records = vec![
            FeedRecord::new(t0, abc(), PriceItem::TradePrice { price: dec!(1), volume: dec!(1) }),
            FeedRecord::new(t0, xyz, PriceItem::TradePrice { price: dec!(2), volume: dec!(1) }),
        ];
        let feed = BinaryFeed::from_records(records);
        assert_eq!(feed.timeframe().start, t0);
    }
}
