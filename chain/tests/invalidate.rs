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

use ember_chain::{FailureState, Options};
use ember_core::core::hash::Hashed;

#[test]
fn invalidate_cascade_reselects_competing_fork() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	// main branch g -> a -> b -> c
	let a = next_header(&chain, &genesis, 1);
	let b = next_header(&chain, &a, 2);
	let c = next_header(&chain, &b, 3);
	// fork a -> x -> y -> z, one block longer so z wins
	let x = next_header(&chain, &a, 10);
	let y = next_header(&chain, &x, 11);
	let z = next_header(&chain, &y, 12);

	for header in &[&a, &b, &c, &x, &y, &z] {
		chain
			.process_new_block_header(header, Options::MIN_WORK_CHECKED)
			.unwrap();
	}
	assert_eq!(chain.head().unwrap().last_block_h, z.hash());
	assert_eq!(chain.head().unwrap().height, 4);

	chain.invalidate_block(&y.hash()).unwrap();

	// y failed validation itself, z only through its ancestry
	assert_eq!(
		chain.status_of(&y.hash()).unwrap().failure,
		FailureState::ValidationFailed
	);
	assert_eq!(
		chain.status_of(&z.hash()).unwrap().failure,
		FailureState::AncestorFailed
	);
	// the untouched part of the fork is fine
	assert_eq!(
		chain.status_of(&x.hash()).unwrap().failure,
		FailureState::NotFailed
	);
	assert_eq!(
		chain.status_of(&a.hash()).unwrap().failure,
		FailureState::NotFailed
	);

	// the competing branch tip is back among the candidates
	assert!(chain.candidate_hashes().contains(&c.hash()));

	// invalidation itself does not activate; the explicit call selects c
	chain.activate_best_chain().unwrap();
	let head = chain.head().unwrap();
	assert_eq!(head.height, 3);
	assert_eq!(head.last_block_h, c.hash());

	// everything stays indexed
	for header in &[&a, &b, &c, &x, &y, &z] {
		assert!(chain.exists(&header.hash()));
	}
}

#[test]
fn invalidating_an_unactivated_branch_only_marks() {
	let (_events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let main = mine_chain(&chain, &genesis, 3, 1);

	// a stub fork that never activated
	let x = next_header(&chain, &genesis, 50);
	chain
		.process_new_block_header(&x, Options::MIN_WORK_CHECKED)
		.unwrap();
	assert_eq!(chain.head().unwrap().last_block_h, main[2].hash());

	chain.invalidate_block(&x.hash()).unwrap();
	assert_eq!(
		chain.status_of(&x.hash()).unwrap().failure,
		FailureState::ValidationFailed
	);
	// the active chain never moved
	assert_eq!(chain.head().unwrap().last_block_h, main[2].hash());
	assert!(!chain.candidate_hashes().contains(&x.hash()));
}

#[test]
fn genesis_cannot_be_invalidated() {
	let (_events, chain) = setup_chain();
	let genesis_hash = chain.params().genesis_hash;
	assert!(chain.invalidate_block(&genesis_hash).is_err());

	let unknown = ember_core::core::hash::Hash([0x42; 32]);
	assert!(chain.invalidate_block(&unknown).is_err());
}

#[test]
fn invalidated_tip_unwinds_to_parent_when_no_fork_exists() {
	let (events, chain) = setup_chain();
	let genesis = chain.params().genesis.clone();

	let headers = mine_chain(&chain, &genesis, 3, 1);
	events.take();

	// invalidate the middle of the active chain
	chain.invalidate_block(&headers[1].hash()).unwrap();

	// unwound below the invalid block, disconnect events in tip-down order
	assert_eq!(events.take(), vec!["disconnect:3", "disconnect:2"]);
	assert_eq!(chain.head().unwrap().height, 1);
	assert_eq!(chain.head().unwrap().last_block_h, headers[0].hash());

	// descendants carry the ancestor failure
	assert_eq!(
		chain.status_of(&headers[2].hash()).unwrap().failure,
		FailureState::AncestorFailed
	);

	// nothing better to activate afterwards
	chain.activate_best_chain().unwrap();
	assert_eq!(chain.head().unwrap().height, 1);
}
