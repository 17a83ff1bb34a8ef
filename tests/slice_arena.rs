use rand::{rngs::StdRng, Rng, SeedableRng};
use skriva::{ByteSlicePool, ByteSliceReader, SliceWriter};
use test_log::test;

fn roundtrip(page_size: usize, payload: &[u8]) {
    let mut pool = ByteSlicePool::with_page_size(page_size);

    let mut writer = SliceWriter::begin(&mut pool);
    writer.write_bytes(payload);
    let (start, end) = (writer.start(), writer.offset());

    let mut reader = ByteSliceReader::new(&pool, start, end);
    let mut out = vec![0; payload.len()];
    reader.read_bytes(&mut out);

    assert_eq!(out, payload);
    assert!(reader.eof());
}

#[test]
fn roundtrip_small_stream() {
    roundtrip(32 * 1_024, b"x");
    roundtrip(32 * 1_024, b"ab");
    roundtrip(32 * 1_024, b"quick brown fox");
}

#[test]
fn roundtrip_grows_through_every_level() {
    // Far past the largest size class, so the level caps and stays there
    let payload = (0..10_000u32).map(|i| i as u8).collect::<Vec<_>>();
    roundtrip(32 * 1_024, &payload);
}

#[test]
fn roundtrip_across_many_pages() {
    let payload = (0..50_000u32).map(|i| (i * 7) as u8).collect::<Vec<_>>();

    // Tiny pages force frequent page rolls
    roundtrip(256, &payload);
    roundtrip(1_024, &payload);
    roundtrip(32 * 1_024, &payload);
}

#[test]
fn roundtrip_random_payloads() {
    let mut rng = StdRng::seed_from_u64(0xBEEF);

    for _ in 0..20 {
        let len = rng.random_range(1..5_000);
        let payload = (0..len).map(|_| rng.random::<u8>()).collect::<Vec<_>>();
        roundtrip(512, &payload);
    }
}

#[test]
fn roundtrip_byte_wise_reads() {
    let payload = (0..3_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();

    let mut pool = ByteSlicePool::with_page_size(1_024);
    let mut writer = SliceWriter::begin(&mut pool);
    writer.write_bytes(&payload);
    let (start, end) = (writer.start(), writer.offset());

    let mut reader = ByteSliceReader::new(&pool, start, end);
    let mut out = Vec::with_capacity(payload.len());

    while !reader.eof() {
        out.push(reader.read_byte());
    }

    assert_eq!(out, payload);
}

#[test]
fn write_to_copies_remainder() {
    let payload = (0..2_000u32).map(|i| (i % 128) as u8).collect::<Vec<_>>();

    let mut pool = ByteSlicePool::new();
    let mut writer = SliceWriter::begin(&mut pool);
    writer.write_bytes(&payload);
    let (start, end) = (writer.start(), writer.offset());

    let mut reader = ByteSliceReader::new(&pool, start, end);
    let mut sink = Vec::new();
    let written = reader.write_to(&mut sink).expect("sink accepts writes");

    assert_eq!(written, payload.len());
    assert_eq!(sink, payload);
    assert!(reader.eof());
}

#[test]
fn interleaved_streams_stay_separate() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut pool = ByteSlicePool::with_page_size(512);

    let mut expected_a = Vec::new();
    let mut expected_b = Vec::new();

    let (a_start, mut a_offset) = {
        let writer = SliceWriter::begin(&mut pool);
        (writer.start(), writer.offset())
    };
    let (b_start, mut b_offset) = {
        let writer = SliceWriter::begin(&mut pool);
        (writer.start(), writer.offset())
    };

    for round in 0..200 {
        let chunk = (0..rng.random_range(1..40))
            .map(|_| rng.random::<u8>())
            .collect::<Vec<_>>();

        if round % 2 == 0 {
            let mut writer = SliceWriter::resume(&mut pool, a_start, a_offset);
            writer.write_bytes(&chunk);
            a_offset = writer.offset();
            expected_a.extend_from_slice(&chunk);
        } else {
            let mut writer = SliceWriter::resume(&mut pool, b_start, b_offset);
            writer.write_bytes(&chunk);
            b_offset = writer.offset();
            expected_b.extend_from_slice(&chunk);
        }
    }

    let mut reader = ByteSliceReader::new(&pool, a_start, a_offset);
    let mut out = vec![0; expected_a.len()];
    reader.read_bytes(&mut out);
    assert_eq!(out, expected_a);

    let mut reader = ByteSliceReader::new(&pool, b_start, b_offset);
    let mut out = vec![0; expected_b.len()];
    reader.read_bytes(&mut out);
    assert_eq!(out, expected_b);
}

#[test]
fn empty_range_is_eof() {
    let mut pool = ByteSlicePool::new();
    let start = pool.new_slice(skriva::FIRST_SLICE_SIZE);

    let reader = ByteSliceReader::new(&pool, start, start);
    assert!(reader.eof());
}

#[test]
fn pool_is_reusable_after_reset() {
    let mut pool = ByteSlicePool::with_page_size(256);

    for _ in 0..3 {
        let payload = (0..2_000u32).map(|i| (i % 199) as u8).collect::<Vec<_>>();

        let mut writer = SliceWriter::begin(&mut pool);
        writer.write_bytes(&payload);
        let (start, end) = (writer.start(), writer.offset());

        let mut reader = ByteSliceReader::new(&pool, start, end);
        let mut out = vec![0; payload.len()];
        reader.read_bytes(&mut out);
        assert_eq!(out, payload);

        pool.reset();
        assert_eq!(pool.position(), 0);
    }
}
