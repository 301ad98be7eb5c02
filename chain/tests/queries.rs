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

use ember_chain::Options;
use ember_core::core::hash::Hashed;

#[test]
fn locator_walks_the_active_chain() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();
	let headers = mine_chain(&chain, &genesis, 40, 1);

	let locator = chain.get_locator();
	// tip first, dense for ten entries, then exponential, genesis last
	assert_eq!(locator[0], headers[39].hash());
	assert_eq!(locator[1], headers[38].hash());
	assert_eq!(locator[9], headers[30].hash());
	assert_eq!(*locator.last().unwrap(), genesis.hash());
	// exponential spacing keeps it compact
	assert!(locator.len() < 18);

	// a locator can start anywhere in the index
	let mid = chain.get_locator_from(&headers[10].hash()).unwrap();
	assert_eq!(mid[0], headers[10].hash());
	assert_eq!(*mid.last().unwrap(), genesis.hash());

	assert!(chain.get_locator_from(&ember_core::core::hash::Hash([9; 32])).is_none());
}

#[test]
fn height_and_header_queries_agree() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();
	let headers = mine_chain(&chain, &genesis, 10, 1);

	assert_eq!(chain.chain_height(), Some(10));
	assert_eq!(chain.hash_at_height(0), Some(genesis.hash()));
	for (i, header) in headers.iter().enumerate() {
		let height = i as u64 + 1;
		assert_eq!(chain.hash_at_height(height), Some(header.hash()));
		assert_eq!(chain.header_at_height(height).unwrap(), *header);
		assert_eq!(chain.height_of(&header.hash()), Some(height));
		assert_eq!(chain.get_header(&header.hash()).unwrap(), *header);
	}
	assert_eq!(chain.hash_at_height(11), None);
	assert_eq!(chain.header_at_height(11), None);
}

#[test]
fn chainwork_strictly_increases_along_the_chain() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();
	let headers = mine_chain(&chain, &genesis, 10, 1);

	let mut last = chain.chainwork_of(&genesis.hash()).unwrap();
	for header in &headers {
		let work = chain.chainwork_of(&header.hash()).unwrap();
		assert!(work > last);
		last = work;
	}
	assert_eq!(chain.head().unwrap().total_work, last);
}

#[test]
fn best_header_survives_losing_the_tip_race() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	// the first branch to three wins the tip
	let winners = mine_chain(&chain, &genesis, 3, 1);
	assert_eq!(chain.best_header().unwrap().last_block_h, winners[2].hash());

	// an equal-work latecomer does not displace the best header either
	let b1 = next_header(&chain, &genesis, 50);
	let b2 = next_header(&chain, &b1, 51);
	let b3 = next_header(&chain, &b2, 52);
	for header in &[&b1, &b2, &b3] {
		chain
			.process_new_block_header(header, Options::MIN_WORK_CHECKED)
			.unwrap();
	}
	assert_eq!(chain.head().unwrap().last_block_h, winners[2].hash());
	assert_eq!(chain.best_header().unwrap().last_block_h, winners[2].hash());

	// one more block on the losing branch moves both tip and best header
	let b4 = next_header(&chain, &b3, 53);
	chain
		.process_new_block_header(&b4, Options::MIN_WORK_CHECKED)
		.unwrap();
	assert_eq!(chain.head().unwrap().last_block_h, b4.hash());
	assert_eq!(chain.best_header().unwrap().last_block_h, b4.hash());
}

#[test]
fn candidate_set_tracks_competing_leaves() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	assert_eq!(chain.candidate_count(), 1); // genesis at startup

	let a = next_header(&chain, &genesis, 1);
	chain
		.process_new_block_header(&a, Options::MIN_WORK_CHECKED)
		.unwrap();
	// the tip itself is pruned from the candidates
	assert_eq!(chain.candidate_count(), 0);

	// an equal-work competitor stays as a candidate leaf
	let b = next_header(&chain, &genesis, 2);
	chain
		.process_new_block_header(&b, Options::MIN_WORK_CHECKED)
		.unwrap();
	assert_eq!(chain.candidate_hashes(), vec![b.hash()]);

	// extending the competitor replaces it with its child and triggers
	// the switch; the old tip loses and is pruned
	let b2 = next_header(&chain, &b, 3);
	chain
		.process_new_block_header(&b2, Options::MIN_WORK_CHECKED)
		.unwrap();
	assert_eq!(chain.head().unwrap().last_block_h, b2.hash());
	assert!(chain.candidate_hashes().is_empty());
}
