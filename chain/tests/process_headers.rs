// Copyright 2025 The Ember Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use chain_test_helper::*;

use ember_chain::{ErrorKind, FailureState, Options};
use ember_core::consensus;
use ember_core::core::hash::{Hash, Hashed};

#[test]
fn grow_empty_chain() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let mut prev = genesis;
	for n in 1..4u64 {
		let header = next_header(&chain, &prev, n as u32);
		let bhash = header.hash();
		chain
			.process_new_block_header(&header, Options::MIN_WORK_CHECKED)
			.unwrap();

		// checking our new head
		let head = chain.head().unwrap();
		assert_eq!(head.height, n);
		assert_eq!(head.last_block_h, bhash);
		assert_eq!(head.prev_block_h, prev.hash());
		prev = header;
	}
	assert_eq!(chain.block_count(), 4);
}

#[test]
fn simple_one_block_reorg() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	// a and b compete at height 1, c extends b
	let a = next_header(&chain, &genesis, 1);
	let b = next_header(&chain, &genesis, 2);
	let c = next_header(&chain, &b, 3);

	chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap();
	assert_eq!(chain.head().unwrap().last_block_h, a.hash());

	chain
		.process_new_block_header(&b, Options::MIN_WORK_CHECKED)
		.unwrap();
	// equal work does not displace the tip
	assert_eq!(chain.head().unwrap().last_block_h, a.hash());

	chain
		.process_new_block_header(&c, Options::MIN_WORK_CHECKED)
		.unwrap();

	let head = chain.head().unwrap();
	assert_eq!(head.height, 2);
	assert_eq!(head.last_block_h, c.hash());

	// a is still indexed but off the active chain, and no longer a
	// candidate now that it has strictly less work than the tip
	assert!(chain.exists(&a.hash()));
	assert!(!chain.is_on_active_chain(&a.hash()));
	assert!(!chain.candidate_hashes().contains(&a.hash()));
}

#[test]
fn equal_work_keeps_first_seen_tip() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let a = next_header(&chain, &genesis, 1);
	chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap();

	let b = next_header(&chain, &genesis, 2);
	chain
		.process_new_block_header(&b, Options::MIN_WORK_CHECKED)
		.unwrap();

	let head = chain.head().unwrap();
	assert_eq!(head.height, 1);
	assert_eq!(head.last_block_h, a.hash());
	// the equal-work competitor stays around as a candidate
	assert!(chain.candidate_hashes().contains(&b.hash()));
}

#[test]
fn orphan_headers_drain_when_parent_arrives() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let a = next_header(&chain, &genesis, 1);
	let b = next_header(&chain, &a, 2);
	let c = next_header(&chain, &b, 3);

	// b and c arrive before a; both are refused as orphans and parked
	for header in &[&b, &c] {
		let err = chain
			.process_new_block_header(header, Options::MIN_WORK_CHECKED)
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::PrevBlockNotFound);
		assert_eq!(err.reject_reason(), "prev-blk-not-found");
		assert!(chain.add_orphan_header(header, 1));
	}
	assert_eq!(chain.orphan_header_count(), 2);
	assert_eq!(chain.peer_orphan_count(1), 2);
	assert!(chain.head().unwrap().height == 0);

	// the parent arrives and the whole parked branch follows it in
	chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap();

	let head = chain.head().unwrap();
	assert_eq!(head.height, 3);
	assert_eq!(head.last_block_h, c.hash());
	assert_eq!(chain.orphan_header_count(), 0);
	assert_eq!(chain.peer_orphan_count(1), 0);
}

#[test]
fn duplicate_processing_is_idempotent() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let a = next_header(&chain, &genesis, 1);
	chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap();
	let head = chain.head().unwrap();
	let count = chain.block_count();

	// a second submission changes nothing and still succeeds
	chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap();
	assert_eq!(chain.head().unwrap(), head);
	assert_eq!(chain.block_count(), count);
}

#[test]
fn missing_work_certification_is_refused() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let a = next_header(&chain, &genesis, 1);
	let err = chain
		.process_new_block_header(&a, Options::NONE)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::TooLittleChainwork);
	assert_eq!(err.reject_reason(), "too-little-chainwork");
	assert!(err.kind().is_soft_reject());
	assert!(!chain.exists(&a.hash()));

	// the same header passes once the caller certifies the gate
	chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap();
	assert!(chain.exists(&a.hash()));
}

#[test]
fn wrong_difficulty_bits_are_rejected() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let mut a = next_header(&chain, &genesis, 1);
	a.bits = 0x1d00ffff;
	let err = chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::BadDiffBits);
	assert_eq!(err.reject_reason(), "bad-diffbits");
	assert!(err.kind().is_consensus_invalid());
}

#[test]
fn timestamps_are_checked_against_parent_and_clock() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	// at or before the parent median is too old
	let mut stale = next_header(&chain, &genesis, 1);
	stale.time = genesis.time;
	let err = chain
		.process_new_block_header(&stale, Options::MIN_WORK_CHECKED)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::TimeTooOld);

	// more than two hours past the local clock is too new
	let mut future = next_header(&chain, &genesis, 2);
	future.time = (consensus::adjusted_time() + 3 * 3600) as u32;
	let err = chain
		.process_new_block_header(&future, Options::MIN_WORK_CHECKED)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::TimeTooNew);
}

#[test]
fn genesis_cannot_reenter_through_acceptance() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	// our own genesis is refused with its dedicated reason
	let err = chain
		.process_new_block_header(&genesis, Options::MIN_WORK_CHECKED)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::GenesisViaAccept);

	// a fake parentless header is a hard reject
	let fake = test_header(&chain, &Hash([0; 32]), genesis.time + 60, 99);
	let err = chain
		.process_new_block_header(&fake, Options::MIN_WORK_CHECKED)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::BadGenesis);
	assert!(!chain.exists(&fake.hash()));
}

#[test]
fn headers_extending_invalid_parents_are_rejected() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let a = next_header(&chain, &genesis, 1);
	let b = next_header(&chain, &a, 2);
	chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap();
	chain
		.process_new_block_header(&b, Options::MIN_WORK_CHECKED)
		.unwrap();

	chain.invalidate_block(&a.hash()).unwrap();
	assert_eq!(
		chain.status_of(&a.hash()).unwrap().failure,
		FailureState::ValidationFailed
	);

	// extending the failed branch is refused
	let c = next_header(&chain, &b, 3);
	let err = chain
		.process_new_block_header(&c, Options::MIN_WORK_CHECKED)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::BadPrevBlock);
	assert_eq!(err.reject_reason(), "bad-prevblk");

	// re-announcing the invalidated header is a duplicate reject
	let err = chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Duplicate);
	assert_eq!(err.reject_reason(), "duplicate");
}

#[test]
fn ibd_latch_is_one_way() {
	let (_events, chain) = setup_chain();

	// a genesis-only chain is always syncing
	assert!(chain.is_in_ibd());

	// a fresh tip with recent time and no minimum-work requirement on
	// regtest ends the initial download
	let genesis = chain.params().genesis.clone();
	let recent = test_header(
		&chain,
		&genesis.hash(),
		(consensus::adjusted_time() - 60) as u32,
		1,
	);
	chain
		.process_new_block_header(&recent, Options::MIN_WORK_CHECKED)
		.unwrap();
	assert!(!chain.is_in_ibd());

	// latched: it never flips back
	assert!(!chain.is_in_ibd());
}

#[test]
fn network_expiration_stops_acceptance() {
	let mut params = ember_core::global::ChainParams::regtest();
	params.expiration_interval = 3;
	let (events, chain) = setup_chain_with(params);
	let genesis = chain.params().genesis.clone();

	let headers = mine_chain(&chain, &genesis, 3, 1);
	assert_eq!(chain.head().unwrap().height, 3);
	// connecting the block at the expiration height warns the host
	assert!(events.snapshot().contains(&"expired:3:3".to_string()));

	// one block beyond the interval is refused outright
	let beyond = next_header(&chain, headers.last().unwrap(), 9);
	let err = chain
		.process_new_block_header(&beyond, Options::MIN_WORK_CHECKED)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::NetworkExpired(4));
	assert_eq!(err.reject_reason(), "network-expired");
	assert_eq!(chain.head().unwrap().height, 3);
	assert!(events.snapshot().contains(&"expired:4:3".to_string()));
}

#[test]
fn anti_dos_threshold_tracks_the_tip() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	// regtest has no minimum chain work; with a short chain the buffer
	// swallows everything
	assert!(chain.anti_dos_work_threshold().is_zero());

	mine_chain(&chain, &genesis, 5, 1);
	assert!(chain.anti_dos_work_threshold().is_zero());

	// deep enough and the threshold starts trailing the tip
	let more = mine_chain(
		&chain,
		&chain.header_at_height(5).unwrap(),
		150,
		100,
	);
	let tip_work = chain.chainwork_of(&more.last().unwrap().hash()).unwrap();
	let threshold = chain.anti_dos_work_threshold();
	assert!(!threshold.is_zero());
	assert!(threshold < tip_work);
}
