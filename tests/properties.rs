//! Property tests for the retry budget and keep-alive bounds

mod common;

use std::time::Duration;

use common::*;
use proptest::prelude::*;
use sep_client::seclient::{
    ClientState, SepClientConfig, KEEPALIVE_PERIOD_MAXIMUM, KEEPALIVE_PERIOD_MINIMUM,
};
use sep_client::zigbee::ZigBeeNetworkState;

proptest! {
    #[test]
    fn prop_retry_budget(max_retries in 0u32..8, fires in 0u32..12) {
        let result = tokio_test::block_on(async {
            let config = SepClientConfig { max_retries, ..SepClientConfig::default() };
            let mut h = Harness::with_config(config);
            h.network.add_node(trust_centre());
            h.client.network_state_updated(ZigBeeNetworkState::Online);

            for _ in 0..fires {
                if h.client.state() == ClientState::Idle {
                    break;
                }
                h.fire().await;
            }
            (h.client.state(), h.client.retry_counter(), h.network.match_requests().len())
        });
        let (state, counter, requests) = result;

        // One request per fire while the budget lasts, then give up
        if fires <= max_retries + 1 {
            prop_assert_eq!(state, ClientState::DiscoverKeyEstablishmentCluster);
            prop_assert_eq!(counter, fires);
            prop_assert_eq!(requests as u32, fires);
        } else {
            prop_assert_eq!(state, ClientState::Idle);
            prop_assert_eq!(requests as u32, max_retries + 1);
        }
    }

    #[test]
    fn prop_keep_alive_period_bounds(millis in 0u64..2_000_000) {
        let period = Duration::from_millis(millis);
        let in_range = period >= KEEPALIVE_PERIOD_MINIMUM && period <= KEEPALIVE_PERIOD_MAXIMUM;

        let accepted = tokio_test::block_on(async {
            let mut h = Harness::new();
            let before = h.client.keep_alive_period();
            let accepted = h.client.set_keep_alive_period(period).is_ok();
            if !accepted {
                assert_eq!(h.client.keep_alive_period(), before);
            }
            accepted
        });
        prop_assert_eq!(accepted, in_range);
    }

    #[test]
    fn prop_config_keep_alive_validation(millis in 0u64..2_000_000) {
        let config = SepClientConfig {
            keep_alive_period: Duration::from_millis(millis),
            ..SepClientConfig::default()
        };
        let in_range = (300_000..=1_200_000).contains(&millis);
        prop_assert_eq!(config.validate().is_ok(), in_range);
    }
}
