// ==========================================
// 并发放置测试
// ==========================================
// 职责: 验证手术/医生/手术室锁串行化、批量自动放置与持久化超时
// ==========================================


#[cfg(test)]
mod concurrent_placement_test {
    use crate::test_helpers::*;
    use chrono::{Duration, NaiveDateTime};
    use or_scheduler::config::SchedulingConfig;
    use or_scheduler::domain::{
        ApprovalStatus, Equipment, OperatingRoom, Priority, ScheduleSlot, SlotType, Staff,
        Surgery, SurgeryStatus, TimeWindow,
    };
    use or_scheduler::engine::{ScheduleError, SchedulingOrchestrator};
    use or_scheduler::repository::{
        InMemoryScheduleRepository, PlacementCommit, RepositoryResult, RoomRevision,
        ScheduleRepository,
    };
    use std::sync::Arc;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn occupied(slots: &[ScheduleSlot]) -> Vec<TimeWindow> {
        let mut by_surgery: Vec<(String, NaiveDateTime, NaiveDateTime)> = Vec::new();
        for s in slots {
            match by_surgery.iter_mut().find(|(id, _, _)| *id == s.surgery_id) {
                Some(entry) => {
                    entry.1 = entry.1.min(s.start_time);
                    entry.2 = entry.2.max(s.end_time);
                }
                None => by_surgery.push((s.surgery_id.clone(), s.start_time, s.end_time)),
            }
        }
        by_surgery
            .into_iter()
            .map(|(_, start, end)| TimeWindow::new(start, end))
            .collect()
    }

    fn assert_no_overlap(windows: &[TimeWindow]) {
        for (i, a) in windows.iter().enumerate() {
            for b in windows.iter().skip(i + 1) {
                assert!(!a.overlaps(b), "占用区间重叠: {:?} / {:?}", a, b);
            }
        }
    }

    // ==========================================
    // 测试用例
    // ==========================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_place_same_window_only_one_wins() {
        let h = Harness::new(at(6, 0));
        h.repo.upsert_room(room("OR-1")).unwrap();
        for i in 0..6 {
            h.repo
                .upsert_surgery(surgery(&format!("S-{}", i), 60, at(5, 0)))
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..6 {
            let orchestrator = Arc::clone(&h.orchestrator);
            handles.push(tokio::spawn(async move {
                orchestrator
                    .place(&scheduler(), &format!("S-{}", i), "OR-1", at(9, 0), at(10, 0))
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(err) => assert_eq!(err.violated_rules(), ["no_overlap"]),
            }
        }

        assert_eq!(ok, 1);
        let slots = h.repo.all_slots().unwrap();
        assert_eq!(slots.len(), 3);
        assert_no_overlap(&occupied(&slots));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_auto_place_many_serializes_into_one_room() {
        let h = Harness::new(at(6, 0));
        h.repo.upsert_room(room("OR-1")).unwrap();
        let ids: Vec<String> = (0..5).map(|i| format!("S-{}", i)).collect();
        for id in &ids {
            h.repo.upsert_surgery(surgery(id, 60, at(5, 0))).unwrap();
        }

        let results = h
            .orchestrator
            .auto_place_many(&scheduler(), &ids, Some(day()))
            .await;

        assert_eq!(results.len(), 5);
        for (id, result) in &results {
            let outcome = result.as_ref().unwrap();
            assert_eq!(&outcome.surgery_id, id);
            assert_eq!(outcome.end - outcome.start, Duration::minutes(60));
        }

        let slots = h.repo.all_slots().unwrap();
        assert_eq!(slots.len(), 15);
        assert_eq!(
            slots.iter().filter(|s| s.slot_type == SlotType::Surgery).count(),
            5
        );
        assert_no_overlap(&occupied(&slots));

        // 连续放置: 最后一台清洁结束于 14:30
        let last_end = slots.iter().map(|s| s.end_time).max().unwrap();
        assert_eq!(last_end, at(14, 30));
        for id in &ids {
            assert_eq!(h.surgery(id).status, SurgeryStatus::Scheduled);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_auto_place_many_spreads_across_rooms_when_full() {
        // 手术日 07:00-10:00，每间手术室只容纳两台 60 分钟手术
        let mut config = config();
        config.day_end_hour = 10;
        config.overtime_hour = 10;
        let h = Harness::with_config(at(6, 0), config);
        h.repo.upsert_room(room("OR-1")).unwrap();
        h.repo.upsert_room(room("OR-2")).unwrap();
        let ids: Vec<String> = (0..5).map(|i| format!("S-{}", i)).collect();
        for id in &ids {
            h.repo.upsert_surgery(surgery(id, 60, at(5, 0))).unwrap();
        }

        let results = h
            .orchestrator
            .auto_place_many(&scheduler(), &ids, Some(day()))
            .await;

        let placed = results.iter().filter(|(_, r)| r.is_ok()).count();
        let infeasible = results
            .iter()
            .filter(|(_, r)| matches!(r, Err(ScheduleError::NoFeasibleSlot { .. })))
            .count();
        assert_eq!(placed, 4);
        assert_eq!(infeasible, 1);

        let slots = h.repo.all_slots().unwrap();
        for room_id in ["OR-1", "OR-2"] {
            let room_slots: Vec<ScheduleSlot> =
                slots.iter().filter(|s| s.room_id == room_id).cloned().collect();
            assert_eq!(room_slots.len(), 6);
            assert_no_overlap(&occupied(&room_slots));
        }
    }

    // ==========================================
    // 外部写入 / 超时
    // ==========================================

    /// 包装内存仓储: 查询手术时阻塞、提交前阻塞、或在提交前插入外部写入
    struct InterferingRepository {
        inner: InMemoryScheduleRepository,
        find_delay: Option<std::time::Duration>,
        commit_delay: Option<std::time::Duration>,
        external_write: Option<ScheduleSlot>,
    }

    impl ScheduleRepository for InterferingRepository {
        fn find_surgery(&self, facility_id: &str, surgery_id: &str) -> RepositoryResult<Option<Surgery>> {
            if let Some(delay) = self.find_delay {
                std::thread::sleep(delay);
            }
            self.inner.find_surgery(facility_id, surgery_id)
        }

        fn list_active_surgeries(&self, facility_id: &str) -> RepositoryResult<Vec<Surgery>> {
            self.inner.list_active_surgeries(facility_id)
        }

        fn update_surgery_status(
            &self,
            facility_id: &str,
            surgery_id: &str,
            expected: SurgeryStatus,
            status: SurgeryStatus,
            approval_status: Option<ApprovalStatus>,
            at: NaiveDateTime,
        ) -> RepositoryResult<()> {
            self.inner.update_surgery_status(
                facility_id,
                surgery_id,
                expected,
                status,
                approval_status,
                at,
            )
        }

        fn update_surgery_priority(
            &self,
            facility_id: &str,
            surgery_id: &str,
            expected: Priority,
            priority: Priority,
            at: NaiveDateTime,
        ) -> RepositoryResult<()> {
            self.inner
                .update_surgery_priority(facility_id, surgery_id, expected, priority, at)
        }

        fn update_predicted_duration(
            &self,
            facility_id: &str,
            surgery_id: &str,
            predicted_duration_min: u32,
            at: NaiveDateTime,
        ) -> RepositoryResult<()> {
            self.inner
                .update_predicted_duration(facility_id, surgery_id, predicted_duration_min, at)
        }

        fn list_rooms(&self, facility_id: &str) -> RepositoryResult<Vec<OperatingRoom>> {
            self.inner.list_rooms(facility_id)
        }

        fn find_staff(&self, facility_id: &str, staff_id: &str) -> RepositoryResult<Option<Staff>> {
            self.inner.find_staff(facility_id, staff_id)
        }

        fn list_equipment(&self, facility_id: &str) -> RepositoryResult<Vec<Equipment>> {
            self.inner.list_equipment(facility_id)
        }

        fn list_slots_in_range(
            &self,
            facility_id: &str,
            range: TimeWindow,
        ) -> RepositoryResult<Vec<ScheduleSlot>> {
            self.inner.list_slots_in_range(facility_id, range)
        }

        fn list_slots_for_surgery(
            &self,
            facility_id: &str,
            surgery_id: &str,
        ) -> RepositoryResult<Vec<ScheduleSlot>> {
            self.inner.list_slots_for_surgery(facility_id, surgery_id)
        }

        fn room_revision(&self, facility_id: &str, room_id: &str) -> RepositoryResult<u64> {
            self.inner.room_revision(facility_id, room_id)
        }

        fn commit_placement(&self, facility_id: &str, commit: PlacementCommit) -> RepositoryResult<()> {
            if let Some(delay) = self.commit_delay {
                std::thread::sleep(delay);
            }
            // 模拟本进程之外的写入者在复核与提交之间写入同一手术室
            if let Some(slot) = &self.external_write {
                self.inner.insert_slots(vec![slot.clone()])?;
            }
            self.inner.commit_placement(facility_id, commit)
        }

        fn release_surgery_slots(
            &self,
            facility_id: &str,
            surgery_id: &str,
            expected_status: SurgeryStatus,
            status: SurgeryStatus,
            expected_revisions: &[RoomRevision],
            at: NaiveDateTime,
        ) -> RepositoryResult<usize> {
            self.inner.release_surgery_slots(
                facility_id,
                surgery_id,
                expected_status,
                status,
                expected_revisions,
                at,
            )
        }
    }

    fn interfering(
        find_delay: Option<std::time::Duration>,
        external_write: Option<ScheduleSlot>,
    ) -> Arc<InterferingRepository> {
        let inner = InMemoryScheduleRepository::new();
        inner.upsert_room(room("OR-1")).unwrap();
        inner.upsert_surgery(surgery("S-1", 60, at(5, 0))).unwrap();
        Arc::new(InterferingRepository {
            inner,
            find_delay,
            commit_delay: None,
            external_write,
        })
    }

    /// 提交前阻塞 200ms 的仓储: OR-1 / OR-2、医生 DR-1、手术 S-1 / S-A / S-B（均由 DR-1 主刀）
    fn slow_commit() -> Arc<InterferingRepository> {
        let inner = InMemoryScheduleRepository::new();
        inner.upsert_room(room("OR-1")).unwrap();
        inner.upsert_room(room("OR-2")).unwrap();
        inner.upsert_staff(surgeon("DR-1", 12.0)).unwrap();
        for id in ["S-1", "S-A", "S-B"] {
            let mut s = surgery(id, 60, at(5, 0));
            s.surgeon_id = Some("DR-1".to_string());
            inner.upsert_surgery(s).unwrap();
        }
        Arc::new(InterferingRepository {
            inner,
            find_delay: None,
            commit_delay: Some(std::time::Duration::from_millis(200)),
            external_write: None,
        })
    }

    #[tokio::test]
    async fn test_external_writer_causes_retryable_conflict() {
        let repo = interfering(
            None,
            Some(slot("EXT-1", "OR-1", "S-EXT", None, at(15, 0), at(16, 0))),
        );
        let orchestrator = SchedulingOrchestrator::new(repo.clone(), config());

        let err = orchestrator
            .place(&scheduler(), "S-1", "OR-1", at(9, 0), at(10, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, ScheduleError::ConcurrentModification(_)));
        assert!(err.is_retryable());
        assert!(repo.inner.list_slots_for_surgery(FACILITY, "S-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_repository_times_out() {
        let repo = interfering(Some(std::time::Duration::from_millis(300)), None);
        let config = SchedulingConfig {
            persistence_timeout_ms: 50,
            ..config()
        };
        let orchestrator = SchedulingOrchestrator::new(repo, config);

        let err = orchestrator
            .place(&scheduler(), "S-1", "OR-1", at(9, 0), at(10, 0))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScheduleError::PersistenceTimeout { operation: "find_surgery", timeout_ms: 50 }
        ));
        assert!(err.is_retryable());
    }

    // ==========================================
    // 放置与取消 / 同一医生跨手术室
    // ==========================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_during_slow_commit_is_not_overwritten() {
        let repo = slow_commit();
        let orchestrator = Arc::new(SchedulingOrchestrator::new(repo.clone(), config()));

        let placing = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .place(&scheduler(), "S-1", "OR-1", at(9, 0), at(10, 0))
                    .await
            })
        };
        // 放置已进入提交阶段后再取消
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let cancelled = orchestrator.cancel(&scheduler(), "S-1").await.unwrap();

        assert!(placing.await.unwrap().is_ok());
        assert_eq!(cancelled.released_slots, 3);

        let s = repo.inner.find_surgery(FACILITY, "S-1").unwrap().unwrap();
        assert_eq!(s.status, SurgeryStatus::Cancelled);
        assert!(s.room_id.is_none());
        assert!(repo.inner.list_slots_for_surgery(FACILITY, "S-1").unwrap().is_empty());
    }

    #[test]
    fn test_commit_with_stale_status_is_rejected() {
        let repo = InMemoryScheduleRepository::new();
        repo.upsert_room(room("OR-1")).unwrap();
        repo.upsert_surgery(surgery("S-1", 60, at(5, 0))).unwrap();

        // 读取时为 approved，提交前已被取消
        repo.update_surgery_status(
            FACILITY,
            "S-1",
            SurgeryStatus::Approved,
            SurgeryStatus::Cancelled,
            None,
            at(6, 0),
        )
        .unwrap();

        let window = TimeWindow::new(at(9, 0), at(10, 0));
        let err = repo
            .commit_placement(
                FACILITY,
                PlacementCommit {
                    surgery_id: "S-1".to_string(),
                    room_id: "OR-1".to_string(),
                    surgeon_id: None,
                    scheduled_start: window.start,
                    scheduled_end: window.end,
                    slots: vec![slot("N-1", "OR-1", "S-1", None, window.start, window.end)],
                    expected_status: SurgeryStatus::Approved,
                    expected_revisions: vec![RoomRevision {
                        room_id: "OR-1".to_string(),
                        revision: 0,
                    }],
                    committed_at: at(6, 1),
                },
            )
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(repo.all_slots().unwrap().is_empty());
        assert_eq!(
            repo.find_surgery(FACILITY, "S-1").unwrap().unwrap().status,
            SurgeryStatus::Cancelled
        );

        // 状态比较同样作用于状态写入
        let err = repo
            .update_surgery_status(
                FACILITY,
                "S-1",
                SurgeryStatus::Approved,
                SurgeryStatus::Scheduled,
                None,
                at(6, 2),
            )
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_surgeon_in_two_rooms_only_one_wins() {
        let repo = slow_commit();
        let orchestrator = SchedulingOrchestrator::new(repo.clone(), config());
        let actor = scheduler();

        let (a, b) = tokio::join!(
            orchestrator.place(&actor, "S-A", "OR-1", at(9, 0), at(10, 0)),
            orchestrator.place(&actor, "S-B", "OR-2", at(9, 0), at(10, 0)),
        );

        let results = [a, b];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.violated_rules(), ["surgeon_double_booked"]);
        }

        let surgeon_slots: Vec<ScheduleSlot> = repo
            .inner
            .all_slots()
            .unwrap()
            .into_iter()
            .filter(|s| s.slot_type == SlotType::Surgery && s.surgeon_id.as_deref() == Some("DR-1"))
            .collect();
        assert_eq!(surgeon_slots.len(), 1);
    }
}
