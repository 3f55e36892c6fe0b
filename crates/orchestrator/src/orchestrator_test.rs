#[cfg(test)]
mod orchestrator_tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use uuid::Uuid;

    use dispatch_core::DispatchError;
    use dispatch_domain::entities::{
        ChannelStatus, DispatchChannel, DispatchSession, Location, OverallStatus,
    };
    use dispatch_domain::ports::ChannelAdapter;
    use dispatch_infrastructure::InMemorySessionStore;

    use crate::orchestrator::{DispatchOrchestrator, OrchestratorSettings};
    use crate::retry::RetryPolicy;
    use crate::test_utils::{
        ack_receipt, fast_settings, test_location, test_triage, ScriptedAdapter, ScriptedBehavior,
    };

    fn build_orchestrator(
        adapters: &[Arc<ScriptedAdapter>],
        settings: OrchestratorSettings,
    ) -> DispatchOrchestrator {
        let map: HashMap<DispatchChannel, Arc<dyn ChannelAdapter>> = adapters
            .iter()
            .map(|adapter| {
                (
                    adapter.channel(),
                    Arc::clone(adapter) as Arc<dyn ChannelAdapter>,
                )
            })
            .collect();
        DispatchOrchestrator::new(map, Arc::new(InMemorySessionStore::new()), settings)
    }

    async fn wait_until_sealed(
        orchestrator: &DispatchOrchestrator,
        session_id: Uuid,
        timeout: Duration,
    ) -> DispatchSession {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let snapshot = orchestrator.get_status(session_id).await.unwrap();
            if snapshot.is_sealed() {
                return snapshot;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "会话在 {timeout:?} 内未封存"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_initiate_rejects_invalid_requests() {
        let adapters = [ScriptedAdapter::new(
            DispatchChannel::Hospital,
            ScriptedBehavior::AckAfter(Duration::ZERO),
        )];
        let orchestrator = build_orchestrator(&adapters, fast_settings());

        // 空通道集合
        let result = orchestrator
            .initiate(test_triage(), test_location(), vec![])
            .await;
        assert!(matches!(result, Err(DispatchError::InvalidRequest(_))));

        // 缺少severity
        let mut triage = test_triage();
        triage.severity = "  ".to_string();
        let result = orchestrator
            .initiate(triage, test_location(), vec![DispatchChannel::Hospital])
            .await;
        assert!(matches!(result, Err(DispatchError::InvalidRequest(_))));

        // 非法纬度
        let mut location = test_location();
        location.latitude = 123.0;
        let result = orchestrator
            .initiate(test_triage(), location, vec![DispatchChannel::Hospital])
            .await;
        assert!(matches!(result, Err(DispatchError::InvalidRequest(_))));

        // 未配置适配器的通道
        let result = orchestrator
            .initiate(test_triage(), test_location(), vec![DispatchChannel::Ambulance])
            .await;
        assert!(matches!(result, Err(DispatchError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_initiate_creates_all_configured_channels() {
        let adapters: Vec<_> = DispatchChannel::ALL
            .iter()
            .map(|&channel| {
                ScriptedAdapter::new(channel, ScriptedBehavior::AckAfter(Duration::from_millis(20)))
            })
            .collect();
        let orchestrator = build_orchestrator(&adapters, fast_settings());

        let session = orchestrator
            .initiate(test_triage(), test_location(), DispatchChannel::ALL.to_vec())
            .await
            .unwrap();

        // 通道集合与配置完全一致
        assert_eq!(session.channel_states.len(), 4);
        for channel in DispatchChannel::ALL {
            assert!(session.channel_states.contains_key(&channel));
        }
        assert!(!session.is_sealed());

        let sealed = wait_until_sealed(&orchestrator, session.session_id, Duration::from_secs(2)).await;
        // 封存后通道集合不变
        assert_eq!(sealed.channel_states.len(), 4);
        assert_eq!(sealed.overall_status, OverallStatus::Acknowledged);
    }

    #[tokio::test]
    async fn test_channels_fan_out_concurrently() {
        // 每个通道投递耗时100ms：若串行执行，4个通道的开始时刻会相差至少100ms
        let adapters: Vec<_> = DispatchChannel::ALL
            .iter()
            .map(|&channel| {
                ScriptedAdapter::new(channel, ScriptedBehavior::AckAfter(Duration::from_millis(100)))
            })
            .collect();
        let mut settings = fast_settings();
        settings.attempt_timeout = Duration::from_millis(500);
        let orchestrator = build_orchestrator(&adapters, settings);

        let session = orchestrator
            .initiate(test_triage(), test_location(), DispatchChannel::ALL.to_vec())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let starts: Vec<_> = adapters
            .iter()
            .map(|adapter| {
                let starts = adapter.attempt_starts();
                assert_eq!(starts.len(), 1, "通道 {} 未及时发起投递", adapter.channel());
                starts[0]
            })
            .collect();

        let earliest = *starts.iter().min().unwrap();
        let latest = *starts.iter().max().unwrap();
        assert!(
            latest.duration_since(earliest) < Duration::from_millis(80),
            "通道开始时刻相差 {:?}，投递未并行",
            latest.duration_since(earliest)
        );

        let sealed = wait_until_sealed(&orchestrator, session.session_id, Duration::from_secs(2)).await;
        assert_eq!(sealed.overall_status, OverallStatus::Acknowledged);

        // 每个通道的开始时刻都早于所有通道的最早完成时刻：
        // 开始顺序不依赖任何前序通道的完成
        let earliest_completion = adapters
            .iter()
            .flat_map(|adapter| adapter.completions())
            .min()
            .unwrap();
        for start in starts {
            assert!(start < earliest_completion);
        }
    }

    #[tokio::test]
    async fn test_always_failing_channel_exhausts_after_max_attempts() {
        let adapter = ScriptedAdapter::new(DispatchChannel::Ambulance, ScriptedBehavior::AlwaysFail);
        let orchestrator = build_orchestrator(
            std::slice::from_ref(&adapter),
            fast_settings(),
        );

        let session = orchestrator
            .initiate(test_triage(), test_location(), vec![DispatchChannel::Ambulance])
            .await
            .unwrap();

        let sealed = wait_until_sealed(&orchestrator, session.session_id, Duration::from_secs(2)).await;

        let state = sealed.channel_state(DispatchChannel::Ambulance).unwrap();
        assert_eq!(state.status, ChannelStatus::Exhausted);
        assert_eq!(state.attempt_count, 3);
        assert!(state.last_error.is_some());
        assert_eq!(adapter.attempt_count(), 3);
        assert_eq!(sealed.overall_status, OverallStatus::Failed);
    }

    #[tokio::test]
    async fn test_mixed_outcome_session_is_partial() {
        // 医院立即确认；救护车每次尝试都超时；志愿者和家属第2次尝试成功
        let hospital = ScriptedAdapter::new(
            DispatchChannel::Hospital,
            ScriptedBehavior::AckAfter(Duration::ZERO),
        );
        let ambulance = ScriptedAdapter::new(DispatchChannel::Ambulance, ScriptedBehavior::Hang);
        let volunteer =
            ScriptedAdapter::new(DispatchChannel::Volunteer, ScriptedBehavior::FailTimes(1));
        let family =
            ScriptedAdapter::new(DispatchChannel::FamilySms, ScriptedBehavior::FailTimes(1));

        let adapters = [hospital, ambulance, volunteer, family];
        let orchestrator = build_orchestrator(&adapters, fast_settings());

        let session = orchestrator
            .initiate(test_triage(), test_location(), DispatchChannel::ALL.to_vec())
            .await
            .unwrap();

        let sealed = wait_until_sealed(&orchestrator, session.session_id, Duration::from_secs(3)).await;

        assert_eq!(sealed.overall_status, OverallStatus::Partial);

        let hospital_state = sealed.channel_state(DispatchChannel::Hospital).unwrap();
        assert_eq!(hospital_state.status, ChannelStatus::Acknowledged);
        assert_eq!(hospital_state.attempt_count, 1);
        assert!(hospital_state.acknowledged_at.is_some());

        let ambulance_state = sealed.channel_state(DispatchChannel::Ambulance).unwrap();
        assert_eq!(ambulance_state.status, ChannelStatus::Exhausted);
        assert_eq!(ambulance_state.attempt_count, 3);
        assert!(ambulance_state.last_error.as_deref().unwrap().contains("超时"));

        for channel in [DispatchChannel::Volunteer, DispatchChannel::FamilySms] {
            let state = sealed.channel_state(channel).unwrap();
            assert_eq!(state.status, ChannelStatus::Acknowledged);
            assert_eq!(state.attempt_count, 2);
        }
    }

    #[tokio::test]
    async fn test_session_deadline_times_out_hanging_channels() {
        let adapters: Vec<_> = DispatchChannel::ALL
            .iter()
            .map(|&channel| ScriptedAdapter::new(channel, ScriptedBehavior::Hang))
            .collect();
        let mut settings = fast_settings();
        settings.attempt_timeout = Duration::from_secs(10);
        settings.session_deadline = Duration::from_millis(150);
        let orchestrator = build_orchestrator(&adapters, settings);

        let session = orchestrator
            .initiate(test_triage(), test_location(), DispatchChannel::ALL.to_vec())
            .await
            .unwrap();

        let sealed = wait_until_sealed(&orchestrator, session.session_id, Duration::from_secs(2)).await;

        assert_eq!(sealed.overall_status, OverallStatus::Failed);
        for channel in DispatchChannel::ALL {
            let state = sealed.channel_state(channel).unwrap();
            assert_eq!(state.status, ChannelStatus::TimedOut);
            assert_eq!(state.attempt_count, 1);
        }

        // 截止之后不再发起新的尝试
        tokio::time::sleep(Duration::from_millis(100)).await;
        for adapter in &adapters {
            assert_eq!(adapter.attempt_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_external_ack_preempts_pending_retry() {
        let adapter = ScriptedAdapter::new(DispatchChannel::Volunteer, ScriptedBehavior::AlwaysFail);
        let mut settings = fast_settings();
        settings.retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        let orchestrator = build_orchestrator(std::slice::from_ref(&adapter), settings);

        let session = orchestrator
            .initiate(test_triage(), test_location(), vec![DispatchChannel::Volunteer])
            .await
            .unwrap();

        // 第一次尝试立即失败，通道进入500ms退避等待
        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = orchestrator.get_status(session.session_id).await.unwrap();
        assert_eq!(
            snapshot.channel_state(DispatchChannel::Volunteer).unwrap().status,
            ChannelStatus::Pending
        );

        // 外部确认抢占重试
        orchestrator
            .on_acknowledgment(
                session.session_id,
                DispatchChannel::Volunteer,
                ack_receipt(DispatchChannel::Volunteer),
            )
            .await
            .unwrap();

        let sealed = wait_until_sealed(&orchestrator, session.session_id, Duration::from_secs(1)).await;
        let state = sealed.channel_state(DispatchChannel::Volunteer).unwrap();
        assert_eq!(state.status, ChannelStatus::Acknowledged);
        assert_eq!(state.attempt_count, 1);
        // 退避中的重试被抢占，适配器没有收到第二次调用
        assert_eq!(adapter.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_external_ack_is_noop() {
        let adapter = ScriptedAdapter::new(DispatchChannel::Hospital, ScriptedBehavior::Hang);
        let mut settings = fast_settings();
        settings.attempt_timeout = Duration::from_secs(10);
        let orchestrator = build_orchestrator(std::slice::from_ref(&adapter), settings);

        let session = orchestrator
            .initiate(test_triage(), test_location(), vec![DispatchChannel::Hospital])
            .await
            .unwrap();

        orchestrator
            .on_acknowledgment(
                session.session_id,
                DispatchChannel::Hospital,
                ack_receipt(DispatchChannel::Hospital),
            )
            .await
            .unwrap();

        let first = orchestrator.get_status(session.session_id).await.unwrap();
        let first_state = first.channel_state(DispatchChannel::Hospital).unwrap().clone();
        assert_eq!(first_state.status, ChannelStatus::Acknowledged);

        // 重复确认：无错误，状态不变
        orchestrator
            .on_acknowledgment(
                session.session_id,
                DispatchChannel::Hospital,
                ack_receipt(DispatchChannel::Hospital),
            )
            .await
            .unwrap();

        let second = orchestrator.get_status(session.session_id).await.unwrap();
        let second_state = second.channel_state(DispatchChannel::Hospital).unwrap();
        assert_eq!(second_state.acknowledged_at, first_state.acknowledged_at);
        assert_eq!(second_state.attempt_count, first_state.attempt_count);
    }

    #[tokio::test]
    async fn test_cancel_session_is_idempotent() {
        let adapters: Vec<_> = DispatchChannel::ALL
            .iter()
            .map(|&channel| ScriptedAdapter::new(channel, ScriptedBehavior::Hang))
            .collect();
        let mut settings = fast_settings();
        settings.attempt_timeout = Duration::from_secs(10);
        settings.session_deadline = Duration::from_secs(10);
        let orchestrator = build_orchestrator(&adapters, settings);

        let session = orchestrator
            .initiate(test_triage(), test_location(), DispatchChannel::ALL.to_vec())
            .await
            .unwrap();

        orchestrator.cancel_session(session.session_id).await.unwrap();

        let sealed = wait_until_sealed(&orchestrator, session.session_id, Duration::from_secs(2)).await;
        assert_eq!(sealed.overall_status, OverallStatus::Failed);
        for channel in DispatchChannel::ALL {
            assert_eq!(
                sealed.channel_state(channel).unwrap().status,
                ChannelStatus::TimedOut
            );
        }

        // 再次取消为空操作
        orchestrator.cancel_session(session.session_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_session_not_found() {
        let adapters = [ScriptedAdapter::new(
            DispatchChannel::Hospital,
            ScriptedBehavior::AckAfter(Duration::ZERO),
        )];
        let orchestrator = build_orchestrator(&adapters, fast_settings());
        let unknown = Uuid::new_v4();

        assert!(matches!(
            orchestrator.get_status(unknown).await,
            Err(DispatchError::SessionNotFound { .. })
        ));
        assert!(matches!(
            orchestrator.cancel_session(unknown).await,
            Err(DispatchError::SessionNotFound { .. })
        ));
        assert!(matches!(
            orchestrator
                .on_acknowledgment(unknown, DispatchChannel::Hospital, ack_receipt(DispatchChannel::Hospital))
                .await,
            Err(DispatchError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_served_from_store_after_retention() {
        let adapters = [ScriptedAdapter::new(
            DispatchChannel::Hospital,
            ScriptedBehavior::AckAfter(Duration::ZERO),
        )];
        let orchestrator = build_orchestrator(&adapters, fast_settings());

        let session = orchestrator
            .initiate(test_triage(), test_location(), vec![DispatchChannel::Hospital])
            .await
            .unwrap();
        wait_until_sealed(&orchestrator, session.session_id, Duration::from_secs(1)).await;

        // 等待保留期结束，会话从注册表移除
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(orchestrator.active_session_count().await, 0);

        // 快照仍可从存储读取
        let snapshot = orchestrator.get_status(session.session_id).await.unwrap();
        assert!(snapshot.is_sealed());
        assert_eq!(snapshot.overall_status, OverallStatus::Acknowledged);

        // 保留期后的迟到确认被忽略而非报错
        orchestrator
            .on_acknowledgment(
                session.session_id,
                DispatchChannel::Hospital,
                ack_receipt(DispatchChannel::Hospital),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recent_sessions_include_live_snapshots() {
        let adapters = [ScriptedAdapter::new(
            DispatchChannel::Hospital,
            ScriptedBehavior::AckAfter(Duration::ZERO),
        )];
        let orchestrator = build_orchestrator(&adapters, fast_settings());

        let first = orchestrator
            .initiate(test_triage(), test_location(), vec![DispatchChannel::Hospital])
            .await
            .unwrap();
        let second = orchestrator
            .initiate(test_triage(), test_location(), vec![DispatchChannel::Hospital])
            .await
            .unwrap();

        let recent = orchestrator.recent_sessions(10).await.unwrap();
        let ids: Vec<Uuid> = recent.iter().map(|s| s.session_id).collect();
        assert!(ids.contains(&first.session_id));
        assert!(ids.contains(&second.session_id));
    }
}
