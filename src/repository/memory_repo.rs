// ==========================================
// 手术室排程系统 - 内存仓储
// ==========================================
// 用途: 嵌入式使用 / 单元测试 / 集成测试
// 并发: 单把 RwLock 保护全部状态,commit 在写锁内完成即为原子
// ==========================================

use crate::domain::resource::{Equipment, OperatingRoom, Staff};
use crate::domain::slot::{ScheduleSlot, TimeWindow};
use crate::domain::surgery::Surgery;
use crate::domain::types::{ApprovalStatus, Priority, SurgeryStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{status_conflict, PlacementCommit, RoomRevision, ScheduleRepository};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct MemoryState {
    surgeries: HashMap<String, Surgery>,
    rooms: Vec<OperatingRoom>,
    staff: HashMap<String, Staff>,
    equipment: Vec<Equipment>,
    slots: Vec<ScheduleSlot>,
    revisions: HashMap<(String, String), u64>,
}

impl MemoryState {
    fn revision(&self, facility_id: &str, room_id: &str) -> u64 {
        self.revisions
            .get(&(facility_id.to_string(), room_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn bump(&mut self, facility_id: &str, room_id: &str) {
        *self
            .revisions
            .entry((facility_id.to_string(), room_id.to_string()))
            .or_insert(0) += 1;
    }

    fn check_revisions(&self, facility_id: &str, expected: &[RoomRevision]) -> RepositoryResult<()> {
        for rev in expected {
            let actual = self.revision(facility_id, &rev.room_id);
            if actual != rev.revision {
                return Err(RepositoryError::RevisionConflict {
                    room_id: rev.room_id.clone(),
                    expected: rev.revision,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn surgery_mut(&mut self, facility_id: &str, surgery_id: &str) -> RepositoryResult<&mut Surgery> {
        self.surgeries
            .get_mut(surgery_id)
            .filter(|s| s.facility_id == facility_id)
            .ok_or_else(|| RepositoryError::not_found("Surgery", surgery_id))
    }

    fn check_status(
        &mut self,
        facility_id: &str,
        surgery_id: &str,
        expected: SurgeryStatus,
    ) -> RepositoryResult<()> {
        let actual = self.surgery_mut(facility_id, surgery_id)?.status;
        if actual != expected {
            return Err(status_conflict(surgery_id, expected, actual));
        }
        Ok(())
    }
}

// ==========================================
// InMemoryScheduleRepository - 内存仓储
// ==========================================
#[derive(Debug, Default)]
pub struct InMemoryScheduleRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 数据装载（仓储契约之外，供嵌入方/测试使用）
    // ==========================================

    pub fn upsert_surgery(&self, surgery: Surgery) -> RepositoryResult<()> {
        self.write()?
            .surgeries
            .insert(surgery.surgery_id.clone(), surgery);
        Ok(())
    }

    /// 新房间追加到末尾；已存在则原位替换（保持分配顺序）
    pub fn upsert_room(&self, room: OperatingRoom) -> RepositoryResult<()> {
        let mut state = self.write()?;
        match state.rooms.iter_mut().find(|r| r.room_id == room.room_id) {
            Some(existing) => *existing = room,
            None => state.rooms.push(room),
        }
        Ok(())
    }

    pub fn upsert_staff(&self, staff: Staff) -> RepositoryResult<()> {
        self.write()?.staff.insert(staff.staff_id.clone(), staff);
        Ok(())
    }

    pub fn upsert_equipment(&self, equipment: Equipment) -> RepositoryResult<()> {
        let mut state = self.write()?;
        state
            .equipment
            .retain(|e| e.equipment_id != equipment.equipment_id);
        state.equipment.push(equipment);
        Ok(())
    }

    /// 直接插入时段（历史数据装载），同时递增房间版本号
    pub fn insert_slots(&self, slots: Vec<ScheduleSlot>) -> RepositoryResult<()> {
        let mut state = self.write()?;
        for slot in slots {
            let (facility_id, room_id) = (slot.facility_id.clone(), slot.room_id.clone());
            state.slots.push(slot);
            state.bump(&facility_id, &room_id);
        }
        Ok(())
    }

    /// 全部时段快照（按开始时间排序）
    pub fn all_slots(&self) -> RepositoryResult<Vec<ScheduleSlot>> {
        let mut slots = self.read()?.slots.clone();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }
}

impl ScheduleRepository for InMemoryScheduleRepository {
    fn find_surgery(
        &self,
        facility_id: &str,
        surgery_id: &str,
    ) -> RepositoryResult<Option<Surgery>> {
        Ok(self
            .read()?
            .surgeries
            .get(surgery_id)
            .filter(|s| s.facility_id == facility_id)
            .cloned())
    }

    fn list_active_surgeries(&self, facility_id: &str) -> RepositoryResult<Vec<Surgery>> {
        let mut active: Vec<Surgery> = self
            .read()?
            .surgeries
            .values()
            .filter(|s| s.facility_id == facility_id && s.status.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.surgery_id.cmp(&b.surgery_id));
        Ok(active)
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
        let mut state = self.write()?;
        state.check_status(facility_id, surgery_id, expected)?;
        let surgery = state.surgery_mut(facility_id, surgery_id)?;
        surgery.status = status;
        if let Some(approval) = approval_status {
            surgery.approval_status = approval;
        }
        surgery.updated_at = at;
        Ok(())
    }

    fn update_surgery_priority(
        &self,
        facility_id: &str,
        surgery_id: &str,
        expected: Priority,
        priority: Priority,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let mut state = self.write()?;
        let surgery = state.surgery_mut(facility_id, surgery_id)?;
        if surgery.priority != expected {
            return Err(RepositoryError::ConcurrentUpdate {
                entity: "Surgery".to_string(),
                id: surgery_id.to_string(),
                message: format!("priority 期望 {}，实际 {}", expected, surgery.priority),
            });
        }
        surgery.priority = priority;
        surgery.updated_at = at;
        Ok(())
    }

    fn update_predicted_duration(
        &self,
        facility_id: &str,
        surgery_id: &str,
        predicted_duration_min: u32,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let mut state = self.write()?;
        let surgery = state.surgery_mut(facility_id, surgery_id)?;
        surgery.predicted_duration_min = Some(predicted_duration_min);
        surgery.updated_at = at;
        Ok(())
    }

    fn list_rooms(&self, facility_id: &str) -> RepositoryResult<Vec<OperatingRoom>> {
        Ok(self
            .read()?
            .rooms
            .iter()
            .filter(|r| r.facility_id == facility_id)
            .cloned()
            .collect())
    }

    fn find_staff(&self, facility_id: &str, staff_id: &str) -> RepositoryResult<Option<Staff>> {
        Ok(self
            .read()?
            .staff
            .get(staff_id)
            .filter(|s| s.facility_id == facility_id)
            .cloned())
    }

    fn list_equipment(&self, facility_id: &str) -> RepositoryResult<Vec<Equipment>> {
        Ok(self
            .read()?
            .equipment
            .iter()
            .filter(|e| e.facility_id == facility_id)
            .cloned()
            .collect())
    }

    fn list_slots_in_range(
        &self,
        facility_id: &str,
        range: TimeWindow,
    ) -> RepositoryResult<Vec<ScheduleSlot>> {
        let mut slots: Vec<ScheduleSlot> = self
            .read()?
            .slots
            .iter()
            .filter(|s| s.facility_id == facility_id && s.window().overlaps(&range))
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    fn list_slots_for_surgery(
        &self,
        facility_id: &str,
        surgery_id: &str,
    ) -> RepositoryResult<Vec<ScheduleSlot>> {
        let mut slots: Vec<ScheduleSlot> = self
            .read()?
            .slots
            .iter()
            .filter(|s| s.facility_id == facility_id && s.surgery_id == surgery_id)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    fn room_revision(&self, facility_id: &str, room_id: &str) -> RepositoryResult<u64> {
        Ok(self.read()?.revision(facility_id, room_id))
    }

    fn commit_placement(
        &self,
        facility_id: &str,
        commit: PlacementCommit,
    ) -> RepositoryResult<()> {
        let mut state = self.write()?;

        // 1) 版本校验（任何失败都不产生部分写入）
        state.check_status(facility_id, &commit.surgery_id, commit.expected_status)?;
        state.check_revisions(facility_id, &commit.expected_revisions)?;

        // 2) 删除旧时段
        let old_rooms: Vec<String> = state
            .slots
            .iter()
            .filter(|s| s.facility_id == facility_id && s.surgery_id == commit.surgery_id)
            .map(|s| s.room_id.clone())
            .collect();
        state
            .slots
            .retain(|s| !(s.facility_id == facility_id && s.surgery_id == commit.surgery_id));

        // 3) 插入新时段
        state.slots.extend(commit.slots);

        // 4) 递增版本号
        let mut touched = old_rooms;
        touched.push(commit.room_id.clone());
        touched.sort();
        touched.dedup();
        for room_id in &touched {
            state.bump(facility_id, room_id);
        }

        // 5) 更新手术
        let surgery = state.surgery_mut(facility_id, &commit.surgery_id)?;
        surgery.status = SurgeryStatus::Scheduled;
        surgery.room_id = Some(commit.room_id);
        surgery.surgeon_id = commit.surgeon_id.or(surgery.surgeon_id.take());
        surgery.scheduled_start = Some(commit.scheduled_start);
        surgery.scheduled_end = Some(commit.scheduled_end);
        surgery.updated_at = commit.committed_at;

        Ok(())
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
        let mut state = self.write()?;
        state.check_status(facility_id, surgery_id, expected_status)?;
        state.check_revisions(facility_id, expected_revisions)?;

        let mut touched: Vec<String> = state
            .slots
            .iter()
            .filter(|s| s.facility_id == facility_id && s.surgery_id == surgery_id)
            .map(|s| s.room_id.clone())
            .collect();
        let removed = touched.len();
        state
            .slots
            .retain(|s| !(s.facility_id == facility_id && s.surgery_id == surgery_id));

        touched.sort();
        touched.dedup();
        for room_id in &touched {
            state.bump(facility_id, room_id);
        }

        let surgery = state.surgery_mut(facility_id, surgery_id)?;
        surgery.status = status;
        surgery.room_id = None;
        surgery.scheduled_start = None;
        surgery.scheduled_end = None;
        surgery.updated_at = at;

        Ok(removed)
    }
}
