#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use splitfile_coding::{Encoder, ReedSolomon};

const MAX_BLOCKS: usize = 64;
const MAX_BLOCK_SIZE: usize = 1024;

#[derive(Debug)]
struct FuzzInput {
    redundancy: u16,
    block_size: usize,
    blocks: Vec<Vec<u8>>,
    shuffle_bytes: Vec<u8>,
}

impl<'a> Arbitrary<'a> for FuzzInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let redundancy = u.int_in_range(0..=400)?;
        let block_size = u.int_in_range(1..=MAX_BLOCK_SIZE / 2)? * 2; // even and non-zero
        let count = u.int_in_range(1..=MAX_BLOCKS)?;
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            let len = u.int_in_range(0..=block_size)?; // short blocks are padded
            blocks.push(u.bytes(len)?.to_vec());
        }
        let shuffle_bytes = u.bytes(16)?.to_vec();

        Ok(FuzzInput {
            redundancy,
            block_size,
            blocks,
            shuffle_bytes,
        })
    }
}

fn fuzz(input: FuzzInput) {
    let coding = ReedSolomon::new(input.redundancy);
    let data: Vec<Bytes> = input.blocks.into_iter().map(Bytes::from).collect();
    let check = match coding.encode(&data, input.block_size) {
        Ok(check) => check,
        Err(_) => return,
    };

    assert_eq!(check.len(), coding.check_blocks(data.len()));
    assert!(check.iter().all(|block| block.len() == input.block_size));
    if check.is_empty() {
        return;
    }

    // Drop up to `check.len()` data blocks and recover them from the check blocks
    let padded: Vec<Vec<u8>> = data
        .iter()
        .map(|block| {
            let mut block = block.to_vec();
            block.resize(input.block_size, 0);
            block
        })
        .collect();
    let mut indices: Vec<usize> = (0..data.len()).collect();
    let mut u = Unstructured::new(&input.shuffle_bytes);
    for i in (1..indices.len()).rev() {
        let Ok(j) = u.int_in_range(0..=i) else { break };
        indices.swap(i, j);
    }
    let lost = check.len().min(data.len());
    let (dropped, kept) = indices.split_at(lost);

    let restored = reed_solomon_simd::decode(
        data.len(),
        check.len(),
        kept.iter().map(|&i| (i, &padded[i])),
        check.iter().enumerate().take(lost),
    )
    .expect("decode failed");
    for &i in dropped {
        assert_eq!(restored[&i], padded[i], "restored block mismatch");
    }
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
